//! Greeter endpoint serving greeting sessions over a swarm.
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};

use conclave_keyring::{Keyring, KeyRecord};
use conclave_protocol::{
    encoding::{decode, encode},
    Command, CommandResponse, InvitationId, KeyType, PublicKey,
    RejectReason, SignedMessage,
};

use crate::{
    session::FinishHandler, Error, GreetingSession, Invitation,
    KeyBindingValidator, NetworkSwarm, PartyHost, PeerChannel,
    Result, SecretProvider, SecretValidator, StaticSecret,
    COMMAND_TIMEOUT,
};

type SessionMap =
    HashMap<InvitationId, Arc<Mutex<GreetingSession>>>;

/// Serves greeting commands for the invitations of one party.
///
/// Sessions are recognized by the invitee joining the swarm with
/// the invitation identifier as its peer id. The claim channel
/// accepts claims against invitations written into the party log
/// and issues fresh interactive invitations on a new rendezvous
/// key.
#[derive(Clone)]
pub struct Greeter {
    swarm: Arc<dyn NetworkSwarm>,
    host: Arc<dyn PartyHost>,
    keyring: Keyring,
    greeter_key: PublicKey,
    timeout: Duration,
    sessions: Arc<RwLock<SessionMap>>,
}

impl Greeter {
    /// Create a greeter for a party.
    ///
    /// `greeter_key` must map to a secret-bearing record in the
    /// keyring; it signs the notarized envelopes.
    pub fn new(
        swarm: Arc<dyn NetworkSwarm>,
        host: Arc<dyn PartyHost>,
        keyring: Keyring,
        greeter_key: PublicKey,
    ) -> Self {
        Self {
            swarm,
            host,
            keyring,
            greeter_key,
            timeout: COMMAND_TIMEOUT,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Override the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Host an invitation, returning its identifier.
    pub async fn host_invitation(
        &self,
        invitation: Invitation,
        secret_provider: Arc<dyn SecretProvider>,
        secret_validator: Arc<dyn SecretValidator>,
        on_finish: Option<FinishHandler>,
    ) -> InvitationId {
        let id = *invitation.id();
        let session = GreetingSession::new(
            invitation,
            Arc::clone(&self.host),
            self.keyring.clone(),
            self.greeter_key,
            secret_provider,
            secret_validator,
            on_finish,
        );
        let mut writer = self.sessions.write().await;
        writer.insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Revoke a hosted invitation.
    pub async fn revoke_invitation(
        &self,
        id: &InvitationId,
    ) -> Result<()> {
        let reader = self.sessions.read().await;
        let session = reader.get(id).ok_or_else(|| {
            Error::SessionNotFound(id.to_string())
        })?;
        session.lock().await.revoke();
        Ok(())
    }

    /// Accept connections on a swarm key, serving each peer on
    /// its own task.
    pub fn listen<'a>(
        &'a self,
        swarm_key: &'a PublicKey,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>,
    > {
        Box::pin(async move {
            let mut incoming = self.swarm.listen(swarm_key).await?;
            let greeter = self.clone();
            tokio::spawn(async move {
                while let Some(channel) = incoming.recv().await {
                    let greeter = greeter.clone();
                    tokio::spawn(async move {
                        greeter.serve(channel).await;
                    });
                }
            });
            Ok(())
        })
    }

    /// Serve commands from a single peer channel until the
    /// session completes, fails or times out.
    pub async fn serve(&self, mut channel: PeerChannel) {
        loop {
            let buffer = match tokio::time::timeout(
                self.timeout,
                channel.recv(),
            )
            .await
            {
                Ok(Some(buffer)) => buffer,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        peer = %hex::encode(&channel.peer_id),
                        "greeting command timed out"
                    );
                    self.destroy(&channel.peer_id).await;
                    break;
                }
            };

            match self
                .handle_buffer(&channel.peer_id, &buffer)
                .await
            {
                Ok(Some(response)) => {
                    let Ok(buffer) = encode(&response).await
                    else {
                        break;
                    };
                    if channel.send(buffer).await.is_err() {
                        break;
                    }
                }
                // One-way FINISH: the session is complete.
                Ok(None) => {
                    self.destroy(&channel.peer_id).await;
                    break;
                }
                Err(error) => {
                    tracing::warn!(
                        peer = %hex::encode(&channel.peer_id),
                        error = %error,
                        "greeting command failed"
                    );
                    if let Some(reason) = error.reject_reason()
                    {
                        if let Ok(buffer) = encode(
                            &CommandResponse::Rejected(reason),
                        )
                        .await
                        {
                            let _ =
                                channel.send(buffer).await;
                        }
                    }
                    break;
                }
            }
        }
    }

    async fn handle_buffer(
        &self,
        peer_id: &[u8],
        buffer: &[u8],
    ) -> Result<Option<CommandResponse>> {
        let command: Command = decode(buffer).await?;
        if let Command::Claim { id, claim } = command {
            return self.handle_claim(id, claim).await.map(Some);
        }

        let id = InvitationId::from_slice(peer_id)
            .map_err(|_| Error::Rejected(
                RejectReason::InvalidInvitation,
            ))?;
        let session = {
            let reader = self.sessions.read().await;
            reader.get(&id).map(Arc::clone)
        }
        .ok_or(Error::Rejected(
            RejectReason::InvalidInvitation,
        ))?;

        let mut session = session.lock().await;
        session.handle(command).await
    }

    /// Claim an invitation written into the party log.
    ///
    /// The claim must bind the claimant's identity key to the
    /// written invitee key; on success a fresh interactive
    /// invitation is issued on a new rendezvous key whose secret
    /// validator checks the same binding.
    async fn handle_claim(
        &self,
        id: InvitationId,
        claim: SignedMessage,
    ) -> Result<CommandResponse> {
        let written = self
            .host
            .invitation(&id)
            .await?
            .ok_or(Error::Rejected(
                RejectReason::InvalidInvitation,
            ))?;

        let validator =
            KeyBindingValidator::new(written.invitee_key);
        if !validator.check_claim(&claim).await {
            return Err(Error::Rejected(
                RejectReason::InvalidInvitation,
            ));
        }

        let rendezvous_key =
            KeyRecord::generate(KeyType::Unknown).public_key;
        let interactive =
            Invitation::new(self.host.party_key(), None);
        let interactive_id = self
            .host_invitation(
                interactive,
                Arc::new(StaticSecret::new(Vec::<u8>::new())),
                Arc::new(validator),
                None,
            )
            .await;
        self.listen(&rendezvous_key).await?;

        tracing::debug!(
            written = %id,
            interactive = %interactive_id,
            "invitation claimed"
        );
        Ok(CommandResponse::Claimed {
            id: interactive_id,
            rendezvous_key,
        })
    }

    async fn destroy(&self, peer_id: &[u8]) {
        if let Ok(id) = InvitationId::from_slice(peer_id) {
            let mut writer = self.sessions.write().await;
            writer.remove(&id);
        }
    }
}
