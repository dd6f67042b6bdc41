//! Credential payload variants.
use serde::{Deserialize, Serialize};

use crate::{KeyType, PublicKey, SignedMessage};

/// Identifier for party invitations.
pub type InvitationId = uuid::Uuid;

/// Payload variants carried by a signed message.
///
/// The variant tag is surfaced on the wire as the `__type_url`
/// field. The tag is reserved metadata and therefore never part
/// of the canonical signing image, so a payload can be re-tagged
/// or carried in a polymorphic slot without invalidating its
/// signatures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__type_url")]
pub enum Payload {
    /// Start-of-authority credential for a party.
    #[serde(rename = "conclave.credentials.PartyGenesis")]
    PartyGenesis(PartyGenesis),
    /// Admission of a new member key to a party.
    #[serde(rename = "conclave.credentials.KeyAdmit")]
    KeyAdmit(KeyAdmit),
    /// Admission of a new feed to a party.
    #[serde(rename = "conclave.credentials.FeedAdmit")]
    FeedAdmit(FeedAdmit),
    /// A signed message wrapping another signed message.
    #[serde(rename = "conclave.credentials.Envelope")]
    Envelope(Envelope),
    /// Profile information for an identity key.
    #[serde(rename = "conclave.identity.IdentityInfo")]
    IdentityInfo(IdentityInfo),
    /// Profile information for a device key.
    #[serde(rename = "conclave.identity.DeviceInfo")]
    DeviceInfo(DeviceInfo),
    /// Offline invitation written into a party log.
    #[serde(rename = "conclave.greet.PartyInvitation")]
    PartyInvitation(PartyInvitation),
    /// Handshake credential presented by a connecting peer.
    #[serde(rename = "conclave.auth.Auth")]
    Auth(Auth),
}

impl Payload {
    /// Type URL tag for this payload.
    pub fn type_url(&self) -> &'static str {
        match self {
            Self::PartyGenesis(_) => {
                "conclave.credentials.PartyGenesis"
            }
            Self::KeyAdmit(_) => "conclave.credentials.KeyAdmit",
            Self::FeedAdmit(_) => "conclave.credentials.FeedAdmit",
            Self::Envelope(_) => "conclave.credentials.Envelope",
            Self::IdentityInfo(_) => {
                "conclave.identity.IdentityInfo"
            }
            Self::DeviceInfo(_) => "conclave.identity.DeviceInfo",
            Self::PartyInvitation(_) => {
                "conclave.greet.PartyInvitation"
            }
            Self::Auth(_) => "conclave.auth.Auth",
        }
    }

    /// Whether this payload is a party credential.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            Self::PartyGenesis(_)
                | Self::KeyAdmit(_)
                | Self::FeedAdmit(_)
                | Self::Envelope(_)
        )
    }

    /// Whether this payload is an admission credential that may
    /// appear inside a notarized envelope.
    pub fn is_admission(&self) -> bool {
        matches!(self, Self::KeyAdmit(_) | Self::FeedAdmit(_))
    }

    /// Party key named by this payload, when it names one.
    pub fn party_key(&self) -> Option<&PublicKey> {
        match self {
            Self::PartyGenesis(genesis) => Some(&genesis.party_key),
            Self::KeyAdmit(admit) => Some(&admit.party_key),
            Self::FeedAdmit(admit) => Some(&admit.party_key),
            Self::Envelope(envelope) => Some(&envelope.party_key),
            Self::PartyInvitation(invitation) => {
                Some(&invitation.party_key)
            }
            Self::Auth(auth) => Some(&auth.party_key),
            _ => None,
        }
    }
}

/// Start-of-authority credential for a party.
///
/// Signed by the party key, the first feed key and the first
/// member key; the party secret is destroyed after signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyGenesis {
    /// Public key identifying the party.
    pub party_key: PublicKey,
    /// First feed admitted to the party.
    pub feed_key: PublicKey,
    /// First member key admitted to the party.
    pub admit_key: PublicKey,
    /// Type recorded for the first member key.
    pub admit_key_type: KeyType,
}

/// Admission of a new member key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyAdmit {
    /// Party the key is admitted to.
    pub party_key: PublicKey,
    /// Key being admitted.
    pub admit_key: PublicKey,
    /// Type recorded for the admitted key.
    pub admit_key_type: KeyType,
}

/// Admission of a new feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedAdmit {
    /// Party the feed is admitted to.
    pub party_key: PublicKey,
    /// Feed being admitted.
    pub feed_key: PublicKey,
}

/// A signed message carrying another signed message.
///
/// Used when a greeter signs on behalf of an invitee and when a
/// message is copied between parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Party the envelope is addressed to.
    pub party_key: PublicKey,
    /// Wrapped message.
    pub message: Box<SignedMessage>,
}

/// Profile information for an identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityInfo {
    /// Identity key the information belongs to.
    pub identity_key: PublicKey,
    /// Human readable name for the identity.
    pub display_name: String,
}

/// Profile information for a device key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device key the information belongs to.
    pub device_key: PublicKey,
    /// Human readable name for the device.
    pub display_name: String,
}

/// Offline invitation written into a party log by a member.
///
/// Claimed over the greeter's claim channel by proving control
/// of the invitee key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyInvitation {
    /// Identifier for the invitation.
    pub id: InvitationId,
    /// Party the invitation admits to.
    pub party_key: PublicKey,
    /// Member that issued the invitation.
    pub issuer_key: PublicKey,
    /// Key the invitation is bound to.
    pub invitee_key: PublicKey,
}

/// Handshake credential presented by a connecting peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    /// Party the peer claims membership of.
    pub party_key: PublicKey,
    /// Identity the peer claims.
    pub identity_key: PublicKey,
    /// Device key used to sign the credential.
    pub device_key: PublicKey,
    /// Feed the peer intends to replicate from, when announced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_key: Option<PublicKey>,
}
