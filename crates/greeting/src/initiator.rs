//! Invitee side of the greeting protocol.
use std::{sync::Arc, time::Duration};

use conclave_keyring::{Keyring, Signer};
use conclave_party::PartyState;
use conclave_protocol::{
    encoding::{decode, encode},
    Auth, Command, CommandResponse, FeedAdmit, InvitationId,
    KeyAdmit, KeyType, Payload, PublicKey, SignedMessage,
};

use crate::{
    Error, NetworkSwarm, PeerChannel, Result, SecretProvider,
    COMMAND_TIMEOUT,
};

/// What the initiator is joining.
#[derive(Debug, Clone)]
pub enum JoinKind {
    /// Join a party as a new member identity with a writable
    /// feed.
    Party {
        /// Identity key to admit.
        identity_key: PublicKey,
        /// Feed the new member will write to.
        feed_key: PublicKey,
    },
    /// Join one's own identity with a new device and feed.
    Device {
        /// Device key to admit.
        device_key: PublicKey,
        /// Feed the new device will write to.
        feed_key: PublicKey,
    },
}

impl JoinKind {
    fn subject_key(&self) -> PublicKey {
        match self {
            Self::Party { identity_key, .. } => *identity_key,
            Self::Device { device_key, .. } => *device_key,
        }
    }
}

/// Drives a greeting session from the invitee side.
///
/// Connects to the rendezvous swarm using the invitation
/// identifier as the local peer id, walks BEGIN, HANDSHAKE and
/// NOTARIZE, installs the returned hints into a fresh party
/// state and sends the one-way FINISH.
pub struct GreetingInitiator {
    swarm: Arc<dyn NetworkSwarm>,
    keyring: Keyring,
    secret_provider: Arc<dyn SecretProvider>,
    timeout: Duration,
}

impl GreetingInitiator {
    /// Create an initiator.
    ///
    /// The keyring must hold the secrets for the keys named in
    /// the [JoinKind] passed to [GreetingInitiator::join].
    pub fn new(
        swarm: Arc<dyn NetworkSwarm>,
        keyring: Keyring,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            swarm,
            keyring,
            secret_provider,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Override the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Join a party through an interactive invitation.
    ///
    /// Returns the fresh party state with hints installed plus
    /// the greeter-signed envelope copies exactly as written to
    /// the party log.
    pub async fn join(
        &self,
        swarm_key: &PublicKey,
        invitation_id: InvitationId,
        kind: JoinKind,
    ) -> Result<(PartyState, Vec<SignedMessage>)> {
        let mut channel = self
            .swarm
            .join(
                swarm_key,
                invitation_id.as_bytes().to_vec(),
            )
            .await?;

        let (id, auth_nonce) = match self
            .request(&mut channel, &Command::Begin)
            .await?
        {
            CommandResponse::Began { id, auth_nonce } => {
                (id, auth_nonce)
            }
            _ => return Err(Error::UnexpectedResponse("begin")),
        };
        if id != invitation_id {
            tracing::warn!(
                expected = %invitation_id,
                actual = %id,
                "greeter answered for a different invitation"
            );
        }

        let secret =
            self.secret_provider.provide(&auth_nonce).await?;

        let (party_key, nonce) = match self
            .request(
                &mut channel,
                &Command::Handshake {
                    secret: secret.clone(),
                },
            )
            .await?
        {
            CommandResponse::Handshook { party_key, nonce } => {
                (party_key, nonce)
            }
            _ => {
                return Err(Error::UnexpectedResponse(
                    "handshake",
                ))
            }
        };

        let messages = self
            .build_credentials(&party_key, &nonce, &kind)
            .await?;

        let (copies, hints) = match self
            .request(
                &mut channel,
                &Command::Notarize { secret, messages },
            )
            .await?
        {
            CommandResponse::Notarized { copies, hints } => {
                (copies, hints)
            }
            _ => {
                return Err(Error::UnexpectedResponse(
                    "notarize",
                ))
            }
        };

        let mut party = PartyState::new(party_key).await?;
        party.take_hints(&hints).await?;

        self.send(&mut channel, &Command::Finish).await?;

        tracing::debug!(
            party = %party_key,
            subject = %kind.subject_key(),
            "greeting complete"
        );
        Ok((party, copies))
    }

    /// Claim an invitation written into the party log.
    ///
    /// Returns the identifier and rendezvous key of the freshly
    /// issued interactive invitation plus the signed claim; the
    /// claim doubles as the secret for the interactive session.
    pub async fn claim(
        &self,
        swarm_key: &PublicKey,
        id: InvitationId,
        party_key: &PublicKey,
        identity_key: &PublicKey,
    ) -> Result<(InvitationId, PublicKey, SignedMessage)> {
        let identity = self
            .keyring
            .get(identity_key)
            .await
            .ok_or_else(|| {
                Error::Keyring(
                    conclave_keyring::Error::KeyNotFound(
                        identity_key.to_string(),
                    ),
                )
            })?;
        let claim = self
            .keyring
            .sign(
                Payload::Auth(Auth {
                    party_key: *party_key,
                    identity_key: *identity_key,
                    device_key: *identity_key,
                    feed_key: None,
                }),
                &[Signer::Record(identity)],
                None,
                None,
            )
            .await?;

        let mut channel = self
            .swarm
            .join(swarm_key, id.as_bytes().to_vec())
            .await?;
        match self
            .request(
                &mut channel,
                &Command::Claim {
                    id,
                    claim: claim.clone(),
                },
            )
            .await?
        {
            CommandResponse::Claimed {
                id,
                rendezvous_key,
            } => Ok((id, rendezvous_key, claim)),
            _ => Err(Error::UnexpectedResponse("claim")),
        }
    }

    /// Self-signed admissions embedding the session nonce.
    async fn build_credentials(
        &self,
        party_key: &PublicKey,
        nonce: &[u8],
        kind: &JoinKind,
    ) -> Result<Vec<SignedMessage>> {
        let (subject, subject_type, feed_key) = match kind {
            JoinKind::Party {
                identity_key,
                feed_key,
            } => (*identity_key, KeyType::Identity, *feed_key),
            JoinKind::Device {
                device_key,
                feed_key,
            } => (*device_key, KeyType::Device, *feed_key),
        };

        let subject_record = self
            .keyring
            .get(&subject)
            .await
            .ok_or_else(|| {
                Error::Keyring(
                    conclave_keyring::Error::KeyNotFound(
                        subject.to_string(),
                    ),
                )
            })?;
        let feed_record = self
            .keyring
            .get(&feed_key)
            .await
            .ok_or_else(|| {
                Error::Keyring(
                    conclave_keyring::Error::KeyNotFound(
                        feed_key.to_string(),
                    ),
                )
            })?;

        let key_admit = self
            .keyring
            .sign(
                Payload::KeyAdmit(KeyAdmit {
                    party_key: *party_key,
                    admit_key: subject,
                    admit_key_type: subject_type,
                }),
                &[Signer::Record(subject_record.clone())],
                Some(nonce.to_vec()),
                None,
            )
            .await?;
        let feed_admit = self
            .keyring
            .sign(
                Payload::FeedAdmit(FeedAdmit {
                    party_key: *party_key,
                    feed_key,
                }),
                &[
                    Signer::Record(feed_record),
                    Signer::Record(subject_record),
                ],
                Some(nonce.to_vec()),
                None,
            )
            .await?;

        Ok(vec![key_admit, feed_admit])
    }

    async fn send(
        &self,
        channel: &mut PeerChannel,
        command: &Command,
    ) -> Result<()> {
        let buffer = encode(command).await?;
        channel.send(buffer).await
    }

    async fn request(
        &self,
        channel: &mut PeerChannel,
        command: &Command,
    ) -> Result<CommandResponse> {
        self.send(channel, command).await?;
        let buffer = tokio::time::timeout(
            self.timeout,
            channel.recv(),
        )
        .await
        .map_err(|_| Error::CommandTimeout)?
        .ok_or(Error::ChannelClosed)?;
        let response: CommandResponse =
            decode(&buffer).await?;
        if let CommandResponse::Rejected(reason) = response {
            return Err(Error::Rejected(reason));
        }
        Ok(response)
    }
}
