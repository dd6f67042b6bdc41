//! Party manager tying the subsystems together.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{oneshot, RwLock};

use conclave_greeting::{
    Greeter, GreetingInitiator, Invitation, JoinKind,
    NetworkSwarm, PartyHost, SecretProvider, SecretValidator,
    SignedClaimSecret, StaticSecret,
};
use conclave_keyring::{KeyRecord, KeyStore, Keyring, Signer};
use conclave_party::{
    Authenticator, LogStore, PartyLifecycle, PartyState,
};
use conclave_protocol::{
    InvitationId, KeyHint, KeyType, PartyGenesis,
    PartyInvitation, Payload, PublicKey, SignedMessage,
};

use crate::{Error, ManagerConfig, Result};

/// Open party tracked by a manager.
pub struct PartyHandle {
    state: Arc<RwLock<PartyState>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl PartyHandle {
    /// Shared state of the party.
    pub fn state(&self) -> Arc<RwLock<PartyState>> {
        Arc::clone(&self.state)
    }
}

/// Owns the device keyring and the set of open parties.
///
/// Parameterized by a key store for persistence, a log store
/// supplying each party's ordered message stream and a swarm
/// provider for greeting rendezvous. Each open party is driven
/// by its own serial ingestion task; parties never share a
/// mutation path.
pub struct PartyManager {
    config: ManagerConfig,
    keyring: Keyring,
    log: Arc<dyn LogStore>,
    swarm: Arc<dyn NetworkSwarm>,
    parties: Arc<RwLock<HashMap<PublicKey, PartyHandle>>>,
    greeters: Arc<RwLock<HashMap<PublicKey, Greeter>>>,
}

impl PartyManager {
    /// Create a manager over its collaborators, loading the
    /// device keyring from the key store.
    pub async fn new(
        config: ManagerConfig,
        store: Arc<dyn KeyStore>,
        log: Arc<dyn LogStore>,
        swarm: Arc<dyn NetworkSwarm>,
    ) -> Result<Self> {
        let keyring = Keyring::open(store).await?;
        Ok(Self {
            config,
            keyring,
            log,
            swarm,
            parties: Arc::new(RwLock::new(HashMap::new())),
            greeters: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Device keyring owned by this manager.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Create an identity key for this device keyring.
    pub async fn create_identity(&self) -> Result<KeyRecord> {
        Ok(self
            .keyring
            .generate(KeyType::Identity)
            .await?)
    }

    /// The identity key of this device keyring.
    pub async fn identity(&self) -> Result<KeyRecord> {
        self.keyring
            .find_by_type(KeyType::Identity)
            .await
            .into_iter()
            .next()
            .ok_or(Error::NoIdentityKey)
    }

    /// Create a new party: generate the party and feed keys,
    /// write the genesis credential and destroy the party
    /// secret.
    pub async fn create_party(&self) -> Result<PublicKey> {
        let identity = self.identity().await?;
        let party =
            self.keyring.generate(KeyType::Party).await?;
        let feed = self.keyring.generate(KeyType::Feed).await?;

        let genesis = self
            .keyring
            .sign(
                Payload::PartyGenesis(PartyGenesis {
                    party_key: party.public_key,
                    feed_key: feed.public_key,
                    admit_key: identity.public_key,
                    admit_key_type: KeyType::Identity,
                }),
                &[
                    Signer::Record(party.clone()),
                    Signer::Record(feed),
                    Signer::Record(identity),
                ],
                None,
                None,
            )
            .await?;
        self.log.append(&party.public_key, genesis).await?;

        // The start of authority is sealed; the party key never
        // signs again.
        self.keyring
            .delete_secret_key(&party.public_key)
            .await?;

        self.open_party(party.public_key).await?;
        tracing::info!(party = %party.public_key, "party created");
        Ok(party.public_key)
    }

    /// Open a party and start draining its log stream.
    pub async fn open_party(
        &self,
        party_key: PublicKey,
    ) -> Result<Arc<RwLock<PartyState>>> {
        {
            let reader = self.parties.read().await;
            if reader.contains_key(&party_key) {
                return Err(Error::PartyAlreadyOpen(
                    party_key.to_string(),
                ));
            }
        }

        let mut state = PartyState::new(party_key).await?;
        state.set_lifecycle(PartyLifecycle::Opening);
        let state = Arc::new(RwLock::new(state));
        self.install(party_key, Arc::clone(&state)).await?;
        Ok(state)
    }

    /// Close a party, waiting for the message in flight to
    /// drain.
    pub async fn close_party(
        &self,
        party_key: &PublicKey,
    ) -> Result<()> {
        let handle = {
            let mut writer = self.parties.write().await;
            writer.remove(party_key)
        }
        .ok_or_else(|| {
            Error::PartyNotOpen(party_key.to_string())
        })?;

        {
            let mut writer = handle.state.write().await;
            writer.set_lifecycle(PartyLifecycle::Closing);
        }
        if let Some(shutdown) = handle.shutdown {
            let _ = shutdown.send(());
        }
        Ok(())
    }

    /// Shared state of an open party.
    pub async fn party(
        &self,
        party_key: &PublicKey,
    ) -> Option<Arc<RwLock<PartyState>>> {
        let reader = self.parties.read().await;
        reader
            .get(party_key)
            .map(|handle| Arc::clone(&handle.state))
    }

    /// Public keys of all open parties.
    pub async fn parties(&self) -> Vec<PublicKey> {
        let reader = self.parties.read().await;
        reader.keys().copied().collect()
    }

    /// Authenticate a connecting peer's credential against an
    /// open party.
    pub async fn authenticate_peer(
        &self,
        party_key: &PublicKey,
        message: &SignedMessage,
    ) -> Result<()> {
        let party =
            self.party(party_key).await.ok_or_else(|| {
                Error::PartyNotOpen(party_key.to_string())
            })?;
        let authenticator = Authenticator::new(
            chrono::Duration::seconds(
                self.config.auth.max_age as i64,
            ),
            chrono::Duration::seconds(
                self.config.auth.max_skew as i64,
            ),
        );
        let reader = party.read().await;
        authenticator.authenticate(&reader, message).await?;
        Ok(())
    }

    /// Host an interactive invitation for a party.
    ///
    /// Returns the invitation identifier and the rendezvous key
    /// the invitee must join.
    pub async fn host_invitation(
        &self,
        party_key: &PublicKey,
        secret_provider: Arc<dyn SecretProvider>,
        secret_validator: Arc<dyn SecretValidator>,
        expiration: Option<DateTime<Utc>>,
    ) -> Result<(InvitationId, PublicKey)> {
        let greeter = self.greeter(party_key).await?;
        let rendezvous_key =
            KeyRecord::generate(KeyType::Unknown).public_key;
        let id = greeter
            .host_invitation(
                Invitation::new(*party_key, expiration),
                secret_provider,
                secret_validator,
                None,
            )
            .await;
        greeter.listen(&rendezvous_key).await?;
        tracing::info!(
            party = %party_key,
            id = %id,
            "invitation hosted"
        );
        Ok((id, rendezvous_key))
    }

    /// Join a party through an interactive invitation.
    ///
    /// The log layer is expected to replicate the party history
    /// into this manager's log store; the ingestion task picks
    /// it up from there.
    pub async fn join_party(
        &self,
        swarm_key: &PublicKey,
        invitation_id: InvitationId,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Result<PublicKey> {
        let identity = self.identity().await?;
        let feed = self.keyring.generate(KeyType::Feed).await?;

        let initiator = GreetingInitiator::new(
            Arc::clone(&self.swarm),
            self.keyring.clone(),
            secret_provider,
        )
        .with_timeout(self.command_timeout());

        let (mut party, _copies) = initiator
            .join(
                swarm_key,
                invitation_id,
                JoinKind::Party {
                    identity_key: identity.public_key,
                    feed_key: feed.public_key,
                },
            )
            .await?;
        let party_key = *party.public_key();

        {
            let reader = self.parties.read().await;
            if reader.contains_key(&party_key) {
                return Ok(party_key);
            }
        }
        party.set_lifecycle(PartyLifecycle::Opening);
        let state = Arc::new(RwLock::new(party));
        self.install(party_key, state).await?;
        tracing::info!(party = %party_key, "party joined");
        Ok(party_key)
    }

    /// Write an offline invitation bound to an invitee key into
    /// the party log and start serving its claim channel.
    pub async fn write_invitation(
        &self,
        party_key: &PublicKey,
        invitee_key: PublicKey,
    ) -> Result<InvitationId> {
        let identity = self.identity().await?;
        let id = InvitationId::new_v4();
        let message = self
            .keyring
            .sign(
                Payload::PartyInvitation(PartyInvitation {
                    id,
                    party_key: *party_key,
                    issuer_key: identity.public_key,
                    invitee_key,
                }),
                &[Signer::Record(identity)],
                None,
                None,
            )
            .await?;
        self.log.append(party_key, message).await?;
        self.greeter(party_key).await?;
        Ok(id)
    }

    /// Claim an offline invitation and join the party through
    /// the interactive invitation it spawns.
    pub async fn claim_invitation(
        &self,
        party_key: &PublicKey,
        invitation_id: InvitationId,
    ) -> Result<PublicKey> {
        let identity = self.identity().await?;
        let initiator = GreetingInitiator::new(
            Arc::clone(&self.swarm),
            self.keyring.clone(),
            Arc::new(StaticSecret::new(Vec::<u8>::new())),
        )
        .with_timeout(self.command_timeout());

        // The claim channel is served on the party key.
        let (interactive_id, rendezvous_key, claim) = initiator
            .claim(
                party_key,
                invitation_id,
                party_key,
                &identity.public_key,
            )
            .await?;

        self.join_party(
            &rendezvous_key,
            interactive_id,
            Arc::new(SignedClaimSecret::new(claim)),
        )
        .await
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.greeting.command_timeout)
    }

    /// Greeter serving a party's invitations, creating it and
    /// its claim channel on first use.
    async fn greeter(
        &self,
        party_key: &PublicKey,
    ) -> Result<Greeter> {
        {
            let reader = self.greeters.read().await;
            if let Some(greeter) = reader.get(party_key) {
                return Ok(greeter.clone());
            }
        }

        let state =
            self.party(party_key).await.ok_or_else(|| {
                Error::PartyNotOpen(party_key.to_string())
            })?;
        let identity = self.identity().await?;
        let host = Arc::new(ManagerHost {
            party_key: *party_key,
            state,
            log: Arc::clone(&self.log),
        });
        let greeter = Greeter::new(
            Arc::clone(&self.swarm),
            host,
            self.keyring.clone(),
            identity.public_key,
        )
        .with_timeout(self.command_timeout());
        greeter.listen(party_key).await?;

        let mut writer = self.greeters.write().await;
        writer.insert(*party_key, greeter.clone());
        Ok(greeter)
    }

    /// Register a party handle and start its ingestion task.
    async fn install(
        &self,
        party_key: PublicKey,
        state: Arc<RwLock<PartyState>>,
    ) -> Result<()> {
        let mut stream = self.log.stream(&party_key).await?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task_state = Arc::clone(&state);
        tokio::spawn(async move {
            {
                let mut writer = task_state.write().await;
                writer.set_lifecycle(PartyLifecycle::Open);
            }
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    message = stream.next() => {
                        let Some(message) = message else {
                            break;
                        };
                        let mut writer =
                            task_state.write().await;
                        if let Err(error) =
                            writer.process_message(message).await
                        {
                            if abort_ingestion(&error) {
                                tracing::error!(
                                    party = %party_key,
                                    error = %error,
                                    "aborting party ingestion"
                                );
                                break;
                            }
                            tracing::warn!(
                                party = %party_key,
                                error = %error,
                                "credential rejected"
                            );
                        }
                    }
                }
            }
            let mut writer = task_state.write().await;
            writer.set_lifecycle(PartyLifecycle::Closed);
        });

        let mut writer = self.parties.write().await;
        writer.insert(
            party_key,
            PartyHandle {
                state,
                shutdown: Some(shutdown_tx),
            },
        );
        Ok(())
    }
}

/// A malformed genesis or a hostile key chain aborts the
/// party's ingestion loop; everything else is reported and
/// skipped.
fn abort_ingestion(error: &conclave_party::Error) -> bool {
    match error {
        conclave_party::Error::GenesisInvalid(_) => true,
        conclave_party::Error::Keyring(inner) => {
            inner.is_fatal()
        }
        _ => false,
    }
}

struct ManagerHost {
    party_key: PublicKey,
    state: Arc<RwLock<PartyState>>,
    log: Arc<dyn LogStore>,
}

#[async_trait]
impl PartyHost for ManagerHost {
    fn party_key(&self) -> PublicKey {
        self.party_key
    }

    async fn write(
        &self,
        message: SignedMessage,
    ) -> conclave_greeting::Result<()> {
        self.log
            .append(&self.party_key, message)
            .await
            .map_err(conclave_greeting::Error::from)
    }

    async fn hints(
        &self,
    ) -> conclave_greeting::Result<Vec<KeyHint>> {
        let reader = self.state.read().await;
        Ok(reader.member_hints())
    }

    async fn invitation(
        &self,
        id: &InvitationId,
    ) -> conclave_greeting::Result<Option<PartyInvitation>> {
        let reader = self.state.read().await;
        Ok(reader.invitations().invitation(id))
    }
}
