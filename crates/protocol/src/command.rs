//! Greeting command set exchanged between invitee and greeter.
use serde::{Deserialize, Serialize};

use crate::{
    encoding::types, Error, InvitationId, KeyType, PublicKey,
    Result, SignedMessage,
};

/// Hint describing a key that may be installed provisionally in a
/// party keyring to bootstrap replication before the admission
/// credentials have been received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyHint {
    /// Public key of the hinted record.
    pub public_key: PublicKey,
    /// Type of the hinted key.
    pub key_type: KeyType,
}

/// Commands sent by an invitee to a greeter.
#[derive(Default, Debug)]
pub enum Command {
    #[default]
    #[doc(hidden)]
    Noop,
    /// Open the greeting session.
    Begin,
    /// Prove knowledge of the out-of-band secret.
    Handshake {
        /// Out-of-band secret material.
        secret: Vec<u8>,
    },
    /// Submit self-signed admission credentials for notarization
    /// into the party log.
    Notarize {
        /// Out-of-band secret material.
        secret: Vec<u8>,
        /// Self-signed admission messages.
        messages: Vec<SignedMessage>,
    },
    /// Terminate the session. One-way; no response is sent.
    Finish,
    /// Claim an invitation previously written into the party log.
    Claim {
        /// Identifier of the written invitation.
        id: InvitationId,
        /// Signed claim binding the claimant to the invitation.
        claim: SignedMessage,
    },
}

impl From<&Command> for u8 {
    fn from(value: &Command) -> Self {
        match value {
            Command::Noop => types::NOOP,
            Command::Begin => types::COMMAND_BEGIN,
            Command::Handshake { .. } => types::COMMAND_HANDSHAKE,
            Command::Notarize { .. } => types::COMMAND_NOTARIZE,
            Command::Finish => types::COMMAND_FINISH,
            Command::Claim { .. } => types::COMMAND_CLAIM,
        }
    }
}

/// Reason codes for rejected greeting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Unknown or out-of-sequence command.
    InvalidCommand,
    /// Unknown invitation identifier or secret mismatch.
    InvalidInvitation,
    /// Transition not allowed in the current invitation state.
    InvalidState,
    /// Embedded message nonce differs from the invitation nonce.
    InvalidNonce,
    /// Self-signature on an admission payload failed.
    InvalidSignature,
    /// Notarize carried a message that is not an admission.
    InvalidMessageType,
    /// Party key mismatch.
    InvalidParty,
}

impl From<&RejectReason> for u8 {
    fn from(value: &RejectReason) -> Self {
        match value {
            RejectReason::InvalidCommand => 1,
            RejectReason::InvalidInvitation => 2,
            RejectReason::InvalidState => 3,
            RejectReason::InvalidNonce => 4,
            RejectReason::InvalidSignature => 5,
            RejectReason::InvalidMessageType => 6,
            RejectReason::InvalidParty => 7,
        }
    }
}

impl TryFrom<u8> for RejectReason {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::InvalidCommand,
            2 => Self::InvalidInvitation,
            3 => Self::InvalidState,
            4 => Self::InvalidNonce,
            5 => Self::InvalidSignature,
            6 => Self::InvalidMessageType,
            7 => Self::InvalidParty,
            _ => return Err(Error::UnknownRejectReason(value)),
        })
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::InvalidCommand => "invalid command",
                Self::InvalidInvitation => "invalid invitation",
                Self::InvalidState => "invalid state",
                Self::InvalidNonce => "invalid nonce",
                Self::InvalidSignature => "invalid signature",
                Self::InvalidMessageType => "invalid message type",
                Self::InvalidParty => "invalid party",
            }
        )
    }
}

/// Responses returned by a greeter.
#[derive(Default, Debug)]
pub enum CommandResponse {
    #[default]
    #[doc(hidden)]
    Noop,
    /// Command was rejected.
    Rejected(RejectReason),
    /// Session opened.
    Began {
        /// Invitation identifier the session is bound to.
        id: InvitationId,
        /// Nonce the invitee feeds to its secret provider.
        auth_nonce: Vec<u8>,
    },
    /// Secret accepted.
    Handshook {
        /// Party the invitation admits to.
        party_key: PublicKey,
        /// Session nonce that must be embedded in every
        /// notarized credential.
        nonce: Vec<u8>,
    },
    /// Credentials notarized and written to the party.
    Notarized {
        /// Greeter-signed envelopes exactly as written.
        copies: Vec<SignedMessage>,
        /// Hints for bootstrapping replication.
        hints: Vec<KeyHint>,
    },
    /// Invitation claim accepted.
    Claimed {
        /// Identifier of the freshly issued interactive
        /// invitation.
        id: InvitationId,
        /// Rendezvous key for the interactive greeting swarm.
        rendezvous_key: PublicKey,
    },
}

impl From<&CommandResponse> for u8 {
    fn from(value: &CommandResponse) -> Self {
        match value {
            CommandResponse::Noop => types::NOOP,
            CommandResponse::Rejected(_) => types::RESPONSE_REJECTED,
            CommandResponse::Began { .. } => types::RESPONSE_BEGAN,
            CommandResponse::Handshook { .. } => {
                types::RESPONSE_HANDSHOOK
            }
            CommandResponse::Notarized { .. } => {
                types::RESPONSE_NOTARIZED
            }
            CommandResponse::Claimed { .. } => {
                types::RESPONSE_CLAIMED
            }
        }
    }
}
