//! Greeter-side greeting session.
use async_trait::async_trait;
use std::{collections::HashSet, sync::Arc};

use conclave_keyring::{Keyring, Signer};
use conclave_protocol::{
    Command, CommandResponse, Envelope, InvitationId, KeyHint,
    KeyType, PartyInvitation, Payload, PublicKey, RejectReason,
    SignedMessage,
};

use crate::{
    Error, Invitation, Result, SecretProvider, SecretValidator,
};

/// Party-facing capabilities a greeting session needs: writing
/// notarized envelopes, collecting hints and looking up written
/// invitations for the claim channel.
#[async_trait]
pub trait PartyHost: Send + Sync {
    /// Party served by this host.
    fn party_key(&self) -> PublicKey;

    /// Append a notarized envelope to the party log. The append
    /// must be acknowledged before returning.
    async fn write(&self, message: SignedMessage) -> Result<()>;

    /// Hints describing the current membership.
    async fn hints(&self) -> Result<Vec<KeyHint>>;

    /// Look up an offline invitation written into the party.
    async fn invitation(
        &self,
        id: &InvitationId,
    ) -> Result<Option<PartyInvitation>>;
}

/// Callback fired when a session finishes.
pub type FinishHandler =
    Box<dyn FnOnce(InvitationId) + Send + Sync>;

/// Server side of a single invitation.
///
/// A state machine over BEGIN, HANDSHAKE, NOTARIZE and FINISH;
/// every transition is guarded by the prior state and, except
/// for BEGIN, by secret validation.
pub struct GreetingSession {
    invitation: Invitation,
    host: Arc<dyn PartyHost>,
    keyring: Keyring,
    greeter_key: PublicKey,
    secret_provider: Arc<dyn SecretProvider>,
    secret_validator: Arc<dyn SecretValidator>,
    on_finish: Option<FinishHandler>,
}

impl GreetingSession {
    /// Create a session for an invitation.
    pub fn new(
        invitation: Invitation,
        host: Arc<dyn PartyHost>,
        keyring: Keyring,
        greeter_key: PublicKey,
        secret_provider: Arc<dyn SecretProvider>,
        secret_validator: Arc<dyn SecretValidator>,
        on_finish: Option<FinishHandler>,
    ) -> Self {
        Self {
            invitation,
            host,
            keyring,
            greeter_key,
            secret_provider,
            secret_validator,
            on_finish,
        }
    }

    /// Invitation driven by this session.
    pub fn invitation(&self) -> &Invitation {
        &self.invitation
    }

    /// Revoke the underlying invitation.
    pub fn revoke(&mut self) {
        self.invitation.revoke();
    }

    /// Handle an inbound command.
    ///
    /// `Ok(None)` means the one-way FINISH was processed and the
    /// session is complete. Errors reject the command and tear
    /// down the stream.
    pub async fn handle(
        &mut self,
        command: Command,
    ) -> Result<Option<CommandResponse>> {
        match command {
            Command::Begin => {
                self.begin().await.map(Some)
            }
            Command::Handshake { secret } => {
                self.handshake(&secret).await.map(Some)
            }
            Command::Notarize { secret, messages } => self
                .notarize(&secret, messages)
                .await
                .map(Some),
            Command::Finish => {
                self.finish();
                Ok(None)
            }
            _ => Err(RejectReason::InvalidCommand.into()),
        }
    }

    async fn begin(&mut self) -> Result<CommandResponse> {
        if !self.invitation.live()
            || self.invitation.began()
            || self.invitation.secret().is_some()
        {
            return Err(RejectReason::InvalidState.into());
        }

        let secret = self
            .secret_provider
            .provide(self.invitation.auth_nonce())
            .await?;
        self.invitation.set_secret(secret);
        self.invitation.mark_began();

        tracing::debug!(
            id = %self.invitation.id(),
            "greeting began"
        );
        Ok(CommandResponse::Began {
            id: *self.invitation.id(),
            auth_nonce: self.invitation.auth_nonce().to_vec(),
        })
    }

    async fn handshake(
        &mut self,
        secret: &[u8],
    ) -> Result<CommandResponse> {
        if !self.invitation.live()
            || !self.invitation.began()
            || self.invitation.handshook()
        {
            return Err(RejectReason::InvalidState.into());
        }
        self.check_secret(secret).await?;
        self.invitation.mark_handshook();

        Ok(CommandResponse::Handshook {
            party_key: *self.invitation.party_key(),
            nonce: self.invitation.nonce().to_vec(),
        })
    }

    async fn notarize(
        &mut self,
        secret: &[u8],
        messages: Vec<SignedMessage>,
    ) -> Result<CommandResponse> {
        if !self.invitation.live()
            || !self.invitation.handshook()
            || self.invitation.notarized()
        {
            return Err(RejectReason::InvalidState.into());
        }
        self.check_secret(secret).await?;

        let mut admitted = Vec::new();
        for message in &messages {
            admitted.push(self.check_admission(message)?);
        }

        // Wrap each credential in a greeter-signed envelope and
        // persist; the copies travel back to the invitee exactly
        // as written.
        let greeter = self
            .keyring
            .get(&self.greeter_key)
            .await
            .ok_or_else(|| {
                Error::Keyring(
                    conclave_keyring::Error::KeyNotFound(
                        self.greeter_key.to_string(),
                    ),
                )
            })?;
        let mut copies = Vec::with_capacity(messages.len());
        for message in messages {
            let envelope = self
                .keyring
                .sign(
                    Payload::Envelope(Envelope {
                        party_key: self.host.party_key(),
                        message: Box::new(message),
                    }),
                    &[Signer::Record(greeter.clone())],
                    None,
                    None,
                )
                .await?;
            self.host.write(envelope.clone()).await?;
            copies.push(envelope);
        }

        let mut hints = self.host.hints().await?;
        hints.extend(admitted);
        let mut seen = HashSet::new();
        hints.retain(|hint| seen.insert(hint.public_key));

        self.invitation.mark_notarized();
        tracing::debug!(
            id = %self.invitation.id(),
            copies = copies.len(),
            "greeting notarized"
        );
        Ok(CommandResponse::Notarized { copies, hints })
    }

    fn finish(&mut self) {
        if !self.invitation.live() {
            return;
        }
        self.invitation.mark_finished();
        if let Some(on_finish) = self.on_finish.take() {
            on_finish(*self.invitation.id());
        }
        tracing::debug!(
            id = %self.invitation.id(),
            "greeting finished"
        );
    }

    async fn check_secret(&self, secret: &[u8]) -> Result<()> {
        if !self
            .secret_validator
            .validate(&self.invitation, secret)
            .await
        {
            return Err(RejectReason::InvalidInvitation.into());
        }
        Ok(())
    }

    /// Validate a submitted admission credential and produce
    /// the hint it contributes.
    fn check_admission(
        &self,
        message: &SignedMessage,
    ) -> Result<KeyHint> {
        if message.signed.nonce != self.invitation.nonce() {
            return Err(RejectReason::InvalidNonce.into());
        }

        let (key, key_type, party_key) = match message.payload()
        {
            Payload::KeyAdmit(admit) => (
                admit.admit_key,
                admit.admit_key_type,
                admit.party_key,
            ),
            Payload::FeedAdmit(admit) => {
                (admit.feed_key, KeyType::Feed, admit.party_key)
            }
            _ => {
                return Err(
                    RejectReason::InvalidMessageType.into()
                )
            }
        };

        if party_key != self.host.party_key() {
            return Err(RejectReason::InvalidParty.into());
        }

        if !conclave_keyring::validate_signatures(message)
            .unwrap_or(false)
            || !message.was_signed_by(&key)
        {
            return Err(RejectReason::InvalidSignature.into());
        }

        Ok(KeyHint {
            public_key: key,
            key_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EqualityValidator, StaticSecret};
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Mutex;

    struct TestHost {
        party_key: PublicKey,
        written: Mutex<Vec<SignedMessage>>,
    }

    #[async_trait]
    impl PartyHost for TestHost {
        fn party_key(&self) -> PublicKey {
            self.party_key
        }

        async fn write(
            &self,
            message: SignedMessage,
        ) -> crate::Result<()> {
            self.written.lock().await.push(message);
            Ok(())
        }

        async fn hints(&self) -> crate::Result<Vec<KeyHint>> {
            Ok(Vec::new())
        }

        async fn invitation(
            &self,
            _id: &InvitationId,
        ) -> crate::Result<Option<PartyInvitation>> {
            Ok(None)
        }
    }

    struct Fixture {
        session: GreetingSession,
        host: Arc<TestHost>,
        invitee: Keyring,
        invitee_key: PublicKey,
        invitee_feed: PublicKey,
    }

    async fn fixture(
        expiration: Option<chrono::DateTime<Utc>>,
    ) -> Result<Fixture> {
        let party_key: PublicKey = [1u8; 32].into();
        let host = Arc::new(TestHost {
            party_key,
            written: Mutex::new(Vec::new()),
        });

        let greeter_ring = Keyring::new();
        let greeter_key = greeter_ring
            .generate(KeyType::Identity)
            .await?
            .public_key;

        let invitee = Keyring::new();
        let invitee_key = invitee
            .generate(KeyType::Identity)
            .await?
            .public_key;
        let invitee_feed =
            invitee.generate(KeyType::Feed).await?.public_key;

        let session = GreetingSession::new(
            Invitation::new(party_key, expiration),
            Arc::clone(&host) as Arc<dyn PartyHost>,
            greeter_ring,
            greeter_key,
            Arc::new(StaticSecret::new(b"0452".to_vec())),
            Arc::new(EqualityValidator),
            None,
        );

        Ok(Fixture {
            session,
            host,
            invitee,
            invitee_key,
            invitee_feed,
        })
    }

    async fn admissions(
        fixture: &Fixture,
        nonce: &[u8],
    ) -> Result<Vec<SignedMessage>> {
        let identity = fixture
            .invitee
            .get(&fixture.invitee_key)
            .await
            .unwrap();
        let feed = fixture
            .invitee
            .get(&fixture.invitee_feed)
            .await
            .unwrap();
        let key_admit = fixture
            .invitee
            .sign(
                Payload::KeyAdmit(
                    conclave_protocol::KeyAdmit {
                        party_key: fixture.host.party_key,
                        admit_key: fixture.invitee_key,
                        admit_key_type: KeyType::Identity,
                    },
                ),
                &[Signer::Record(identity.clone())],
                Some(nonce.to_vec()),
                None,
            )
            .await?;
        let feed_admit = fixture
            .invitee
            .sign(
                Payload::FeedAdmit(
                    conclave_protocol::FeedAdmit {
                        party_key: fixture.host.party_key,
                        feed_key: fixture.invitee_feed,
                    },
                ),
                &[
                    Signer::Record(feed),
                    Signer::Record(identity),
                ],
                Some(nonce.to_vec()),
                None,
            )
            .await?;
        Ok(vec![key_admit, feed_admit])
    }

    fn reason(error: Error) -> RejectReason {
        error.reject_reason().expect("expected a rejection")
    }

    #[tokio::test]
    async fn full_greeting_flow() -> Result<()> {
        let mut fixture = fixture(None).await?;

        let auth_nonce = match fixture
            .session
            .handle(Command::Begin)
            .await?
            .unwrap()
        {
            CommandResponse::Began { auth_nonce, .. } => {
                auth_nonce
            }
            other => panic!("unexpected response {:?}", other),
        };
        assert!(!auth_nonce.is_empty());

        let nonce = match fixture
            .session
            .handle(Command::Handshake {
                secret: b"0452".to_vec(),
            })
            .await?
            .unwrap()
        {
            CommandResponse::Handshook { nonce, .. } => nonce,
            other => panic!("unexpected response {:?}", other),
        };

        let messages =
            admissions(&fixture, &nonce).await?;
        let (copies, hints) = match fixture
            .session
            .handle(Command::Notarize {
                secret: b"0452".to_vec(),
                messages,
            })
            .await?
            .unwrap()
        {
            CommandResponse::Notarized { copies, hints } => {
                (copies, hints)
            }
            other => panic!("unexpected response {:?}", other),
        };

        // Both credentials written as greeter-signed envelopes.
        assert_eq!(2, copies.len());
        assert_eq!(
            2,
            fixture.host.written.lock().await.len()
        );
        for copy in &copies {
            assert!(matches!(
                copy.payload(),
                Payload::Envelope(_)
            ));
        }
        assert!(hints
            .iter()
            .any(|h| h.public_key == fixture.invitee_key));
        assert!(hints
            .iter()
            .any(|h| h.public_key == fixture.invitee_feed));

        assert!(fixture
            .session
            .handle(Command::Finish)
            .await?
            .is_none());
        assert!(fixture.session.invitation().finished());
        Ok(())
    }

    #[tokio::test]
    async fn expired_invitation_rejects_begin() -> Result<()> {
        let mut fixture = fixture(Some(
            Utc::now() - Duration::seconds(1),
        ))
        .await?;
        assert!(!fixture.session.invitation().live());

        let error = fixture
            .session
            .handle(Command::Begin)
            .await
            .unwrap_err();
        assert_eq!(
            RejectReason::InvalidState,
            reason(error)
        );
        Ok(())
    }

    #[tokio::test]
    async fn commands_after_finish_are_rejected() -> Result<()> {
        let mut fixture = fixture(None).await?;
        fixture.session.handle(Command::Begin).await?;
        fixture
            .session
            .handle(Command::Handshake {
                secret: b"0452".to_vec(),
            })
            .await?;
        fixture.session.handle(Command::Finish).await?;

        let error = fixture
            .session
            .handle(Command::Handshake {
                secret: b"0452".to_vec(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            RejectReason::InvalidState,
            reason(error)
        );
        Ok(())
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() -> Result<()> {
        let mut fixture = fixture(None).await?;
        fixture.session.handle(Command::Begin).await?;

        let error = fixture
            .session
            .handle(Command::Handshake {
                secret: b"9999".to_vec(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            RejectReason::InvalidInvitation,
            reason(error)
        );
        Ok(())
    }

    #[tokio::test]
    async fn notarize_requires_matching_nonce() -> Result<()> {
        let mut fixture = fixture(None).await?;
        fixture.session.handle(Command::Begin).await?;
        fixture
            .session
            .handle(Command::Handshake {
                secret: b"0452".to_vec(),
            })
            .await?;

        // Credentials bound to a stale nonce must be refused.
        let messages =
            admissions(&fixture, &[7u8; 32]).await?;
        let error = fixture
            .session
            .handle(Command::Notarize {
                secret: b"0452".to_vec(),
                messages,
            })
            .await
            .unwrap_err();
        assert_eq!(
            RejectReason::InvalidNonce,
            reason(error)
        );
        Ok(())
    }

    #[tokio::test]
    async fn notarize_refuses_non_admissions() -> Result<()> {
        let mut fixture = fixture(None).await?;
        fixture.session.handle(Command::Begin).await?;
        fixture
            .session
            .handle(Command::Handshake {
                secret: b"0452".to_vec(),
            })
            .await?;
        let nonce =
            fixture.session.invitation().nonce().to_vec();

        let identity = fixture
            .invitee
            .get(&fixture.invitee_key)
            .await
            .unwrap();
        let info = fixture
            .invitee
            .sign(
                Payload::IdentityInfo(
                    conclave_protocol::IdentityInfo {
                        identity_key: fixture.invitee_key,
                        display_name: "mallory".to_owned(),
                    },
                ),
                &[Signer::Record(identity)],
                Some(nonce),
                None,
            )
            .await?;

        let error = fixture
            .session
            .handle(Command::Notarize {
                secret: b"0452".to_vec(),
                messages: vec![info],
            })
            .await
            .unwrap_err();
        assert_eq!(
            RejectReason::InvalidMessageType,
            reason(error)
        );
        Ok(())
    }

    #[tokio::test]
    async fn notarize_happens_exactly_once() -> Result<()> {
        let mut fixture = fixture(None).await?;
        fixture.session.handle(Command::Begin).await?;
        let nonce = match fixture
            .session
            .handle(Command::Handshake {
                secret: b"0452".to_vec(),
            })
            .await?
            .unwrap()
        {
            CommandResponse::Handshook { nonce, .. } => nonce,
            other => panic!("unexpected response {:?}", other),
        };

        let messages = admissions(&fixture, &nonce).await?;
        fixture
            .session
            .handle(Command::Notarize {
                secret: b"0452".to_vec(),
                messages: messages.clone(),
            })
            .await?;

        let error = fixture
            .session
            .handle(Command::Notarize {
                secret: b"0452".to_vec(),
                messages,
            })
            .await
            .unwrap_err();
        assert_eq!(
            RejectReason::InvalidState,
            reason(error)
        );
        Ok(())
    }

    #[tokio::test]
    async fn finish_fires_handler_once() -> Result<()> {
        static FIRED: AtomicBool = AtomicBool::new(false);

        let party_key: PublicKey = [1u8; 32].into();
        let host = Arc::new(TestHost {
            party_key,
            written: Mutex::new(Vec::new()),
        });
        let ring = Keyring::new();
        let greeter_key = ring
            .generate(KeyType::Identity)
            .await?
            .public_key;
        let mut session = GreetingSession::new(
            Invitation::new(party_key, None),
            host as Arc<dyn PartyHost>,
            ring,
            greeter_key,
            Arc::new(StaticSecret::new(b"1".to_vec())),
            Arc::new(EqualityValidator),
            Some(Box::new(|_| {
                FIRED.store(true, Ordering::SeqCst);
            })),
        );

        session.handle(Command::Begin).await?;
        assert!(session
            .handle(Command::Finish)
            .await?
            .is_none());
        assert!(FIRED.load(Ordering::SeqCst));
        Ok(())
    }
}
