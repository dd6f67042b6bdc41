//! Party membership state machine.
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;

use conclave_keyring::{Keyring, KeyRecord, VerifyOptions};
use conclave_protocol::{
    KeyHint, KeyType, Payload, PublicKey, SignedMessage,
};

use crate::{
    identity::IdentityProcessor,
    invitations::InvitationRegistry, Error, PartyEvent, Result,
};

/// Lifecycle of a party.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PartyLifecycle {
    /// Not processing messages.
    #[default]
    Closed,
    /// Ingestion is starting up.
    Opening,
    /// Processing messages.
    Open,
    /// Draining the in-flight message before closing.
    Closing,
}

/// Membership state for a single party.
///
/// Grown monotonically by processing credential messages in the
/// merge order supplied by the log layer; keys and feeds are
/// never removed, only quarantined in the keyring.
pub struct PartyState {
    public_key: PublicKey,
    keyring: Keyring,
    member_keys: Vec<PublicKey>,
    member_feeds: Vec<PublicKey>,
    admitted_by: HashMap<PublicKey, PublicKey>,
    credential_messages: HashMap<PublicKey, SignedMessage>,
    identity: IdentityProcessor,
    invitations: InvitationRegistry,
    pending: VecDeque<SignedMessage>,
    events: broadcast::Sender<PartyEvent>,
    lifecycle: PartyLifecycle,
    genesis_processed: bool,
}

impl PartyState {
    /// Create the state for a party, seeding the per-party
    /// keyring with the party public key.
    pub async fn new(public_key: PublicKey) -> Result<Self> {
        let keyring = Keyring::new();
        keyring
            .add_public_key(KeyRecord::public_record(
                KeyType::Party,
                public_key,
            ))
            .await?;
        let (events, _) = broadcast::channel(1024);
        Ok(Self {
            public_key,
            keyring,
            member_keys: Vec::new(),
            member_feeds: Vec::new(),
            admitted_by: HashMap::new(),
            credential_messages: HashMap::new(),
            identity: IdentityProcessor::default(),
            invitations: InvitationRegistry::default(),
            pending: VecDeque::new(),
            events,
            lifecycle: PartyLifecycle::default(),
            genesis_processed: false,
        })
    }

    /// Public key identifying this party.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Keyring holding this party's trusted keys.
    pub fn keyring(&self) -> &Keyring {
        &self.keyring
    }

    /// Admitted member keys in admission order.
    pub fn member_keys(&self) -> &[PublicKey] {
        &self.member_keys
    }

    /// Admitted feeds in admission order.
    pub fn member_feeds(&self) -> &[PublicKey] {
        &self.member_feeds
    }

    /// Whether a key is an admitted member.
    pub fn is_member(&self, key: &PublicKey) -> bool {
        self.member_keys.contains(key)
    }

    /// Whether a feed is admitted.
    pub fn is_member_feed(&self, key: &PublicKey) -> bool {
        self.member_feeds.contains(key)
    }

    /// Member whose signature authorized an admission.
    pub fn admitted_by(
        &self,
        key: &PublicKey,
    ) -> Option<&PublicKey> {
        self.admitted_by.get(key)
    }

    /// Message that admitted a key or feed, preserved verbatim
    /// for chain building and replication.
    pub fn credential_message(
        &self,
        key: &PublicKey,
    ) -> Option<&SignedMessage> {
        self.credential_messages.get(key)
    }

    /// All admission messages keyed by the admitted key.
    pub fn credential_messages(
        &self,
    ) -> &HashMap<PublicKey, SignedMessage> {
        &self.credential_messages
    }

    /// Identity and device information for members.
    pub fn identity(&self) -> &IdentityProcessor {
        &self.identity
    }

    /// Live invitations written into this party's log.
    pub fn invitations(&self) -> &InvitationRegistry {
        &self.invitations
    }

    /// Lifecycle state.
    pub fn lifecycle(&self) -> PartyLifecycle {
        self.lifecycle
    }

    /// Set the lifecycle state.
    pub fn set_lifecycle(&mut self, lifecycle: PartyLifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Subscribe to membership events.
    pub fn subscribe(&self) -> broadcast::Receiver<PartyEvent> {
        self.events.subscribe()
    }

    /// Number of messages waiting for their admitting
    /// credential to arrive.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ingest a single message in log order.
    ///
    /// Messages signed by keys that are not yet members are
    /// parked and retried after each later admission, so any
    /// arrival order that respects per-feed order converges to
    /// the same membership.
    pub async fn process_message(
        &mut self,
        message: SignedMessage,
    ) -> Result<()> {
        let committed = self.dispatch(message).await?;
        if committed {
            self.drain_pending().await?;
        }
        Ok(())
    }

    /// Install provisional key records from greeting hints.
    ///
    /// Hint records are untrusted and never count as members;
    /// the flag is cleared when the admission message arrives.
    pub async fn take_hints(
        &mut self,
        hints: &[KeyHint],
    ) -> Result<()> {
        for hint in hints {
            if self.keyring.contains(&hint.public_key).await {
                continue;
            }
            self.keyring
                .add_public_key(KeyRecord::hint_record(
                    hint.key_type,
                    hint.public_key,
                ))
                .await?;
        }
        Ok(())
    }

    /// Feed keys installed as hints and not yet admitted.
    pub async fn hinted_feeds(&self) -> Vec<PublicKey> {
        self.keyring
            .find_by_type(KeyType::Feed)
            .await
            .into_iter()
            .filter(|record| record.hint)
            .map(|record| record.public_key)
            .collect()
    }

    /// Hints describing the current membership, handed to an
    /// invitee so it can start replicating immediately.
    pub fn member_hints(&self) -> Vec<KeyHint> {
        let mut hints: Vec<KeyHint> = self
            .member_keys
            .iter()
            .map(|key| KeyHint {
                public_key: *key,
                key_type: KeyType::Identity,
            })
            .collect();
        hints.extend(self.member_feeds.iter().map(|key| {
            KeyHint {
                public_key: *key,
                key_type: KeyType::Feed,
            }
        }));
        hints
    }

    async fn dispatch(
        &mut self,
        message: SignedMessage,
    ) -> Result<bool> {
        if matches!(
            message.payload(),
            Payload::PartyInvitation(_)
        ) {
            return self.handle_invitation(message).await;
        }
        if matches!(
            message.payload(),
            Payload::IdentityInfo(_) | Payload::DeviceInfo(_)
        ) {
            return self.handle_info(message).await;
        }
        if message.payload().is_credential() {
            return self.handle_credential(message).await;
        }
        Err(Error::UnexpectedPayload(
            message.payload().type_url().to_owned(),
        ))
    }

    async fn drain_pending(&mut self) -> Result<()> {
        loop {
            let queue: Vec<SignedMessage> =
                self.pending.drain(..).collect();
            if queue.is_empty() {
                break;
            }
            let mut progress = false;
            for message in queue {
                match self.dispatch(message).await {
                    Ok(true) => progress = true,
                    Ok(false) => {}
                    Err(error) => {
                        // A parked message that turns out to be
                        // bad must not fail the message that
                        // triggered the retry.
                        tracing::warn!(
                            party = %self.public_key,
                            error = %error,
                            "dropping parked message"
                        );
                    }
                }
            }
            if !progress {
                break;
            }
        }
        Ok(())
    }

    /// Process a credential, unwrapping envelope layers.
    ///
    /// The outermost layer must verify against the current
    /// trusted keyring; inner layers only need valid
    /// signatures, as the outer signature carries the
    /// admitting authority.
    async fn handle_credential(
        &mut self,
        message: SignedMessage,
    ) -> Result<bool> {
        if !conclave_keyring::validate_signatures(&message)? {
            return Err(Error::SignatureInvalid);
        }

        let trusted = self
            .keyring
            .verify(
                &message,
                VerifyOptions {
                    require_all_trusted: false,
                    allow_key_chains: true,
                },
            )
            .await?;

        let layers = message.envelope_chain();
        let inner = layers[layers.len() - 1].clone();
        let enveloped = layers.len() > 1;

        if !trusted {
            if matches!(
                inner.payload(),
                Payload::PartyGenesis(_)
            ) {
                return Err(Error::GenesisInvalid(
                    "genesis is not signed by the party key"
                        .to_owned(),
                ));
            }
            // The admitting member's own admission may still be
            // in flight; park the message and retry later.
            tracing::debug!(
                party = %self.public_key,
                payload = %inner.payload().type_url(),
                "no trusted signer yet, parking message"
            );
            self.pending.push_back(message);
            return Ok(false);
        }

        for layer in layers.iter().skip(1) {
            if !conclave_keyring::validate_signatures(layer)? {
                return Err(Error::SignatureInvalid);
            }
        }

        // The member whose signature carries the admitting
        // authority; for enveloped credentials that is a signer
        // of the outermost layer.
        let authority = self.trusted_signer(&message).await;

        match inner.payload().clone() {
            Payload::PartyGenesis(genesis) => {
                self.handle_genesis(genesis, &inner, &message)
                    .await?;
            }
            Payload::KeyAdmit(admit) => {
                self.check_party(&admit.party_key)?;
                if !inner.was_signed_by(&admit.admit_key) {
                    return Err(Error::NotSelfSigned(
                        admit.admit_key.to_string(),
                    ));
                }
                let authority = match self.admit_authority(
                    &message,
                    &admit.admit_key,
                    enveloped,
                    authority,
                ) {
                    Some(authority) => authority,
                    None => {
                        self.pending.push_back(message);
                        return Ok(false);
                    }
                };
                self.admit_key(
                    admit.admit_key,
                    admit.admit_key_type,
                    authority,
                    &message,
                )
                .await?;
            }
            Payload::FeedAdmit(admit) => {
                self.check_party(&admit.party_key)?;
                if !inner.was_signed_by(&admit.feed_key) {
                    return Err(Error::NotSelfSigned(
                        admit.feed_key.to_string(),
                    ));
                }
                let authority = match self.admit_authority(
                    &message,
                    &admit.feed_key,
                    enveloped,
                    authority,
                ) {
                    Some(authority) => authority,
                    None => {
                        self.pending.push_back(message);
                        return Ok(false);
                    }
                };
                self.admit_feed(
                    admit.feed_key,
                    authority,
                    &message,
                )
                .await?;
            }
            _ => {
                return Err(Error::UnexpectedPayload(
                    inner.payload().type_url().to_owned(),
                ))
            }
        }

        Ok(true)
    }

    async fn handle_genesis(
        &mut self,
        genesis: conclave_protocol::PartyGenesis,
        inner: &SignedMessage,
        original: &SignedMessage,
    ) -> Result<()> {
        if self.genesis_processed {
            return Err(Error::GenesisAlreadyProcessed);
        }
        self.check_party(&genesis.party_key)?;

        for key in [
            &genesis.party_key,
            &genesis.feed_key,
            &genesis.admit_key,
        ] {
            if !inner.was_signed_by(key) {
                return Err(Error::GenesisInvalid(format!(
                    "genesis is missing signature by {}",
                    key
                )));
            }
        }

        let party_key = self.public_key;
        self.admit_key(
            genesis.admit_key,
            genesis.admit_key_type,
            party_key,
            original,
        )
        .await?;
        self.admit_feed(genesis.feed_key, party_key, original)
            .await?;
        self.genesis_processed = true;

        tracing::debug!(
            party = %self.public_key,
            member = %genesis.admit_key,
            feed = %genesis.feed_key,
            "genesis processed"
        );
        Ok(())
    }

    async fn handle_info(
        &mut self,
        message: SignedMessage,
    ) -> Result<bool> {
        let Some(subject) =
            IdentityProcessor::subject(message.payload())
        else {
            return Err(Error::UnexpectedPayload(
                message.payload().type_url().to_owned(),
            ));
        };
        if !conclave_keyring::validate_signatures(&message)? {
            return Err(Error::SignatureInvalid);
        }
        if !message.was_signed_by(&subject) {
            return Err(Error::NotSelfSigned(
                subject.to_string(),
            ));
        }
        if !self.is_member(&subject) {
            self.pending.push_back(message);
            return Ok(false);
        }
        self.identity.record(subject, message);
        let _ = self
            .events
            .send(PartyEvent::IdentityInfoUpdated(subject));
        Ok(true)
    }

    async fn handle_invitation(
        &mut self,
        message: SignedMessage,
    ) -> Result<bool> {
        let Payload::PartyInvitation(invitation) =
            message.payload().clone()
        else {
            unreachable!();
        };
        self.check_party(&invitation.party_key)?;
        if !conclave_keyring::validate_signatures(&message)? {
            return Err(Error::SignatureInvalid);
        }
        if !self.is_member(&invitation.issuer_key)
            || !message.was_signed_by(&invitation.issuer_key)
        {
            self.pending.push_back(message);
            return Ok(false);
        }
        tracing::debug!(
            party = %self.public_key,
            id = %invitation.id,
            invitee = %invitation.invitee_key,
            "invitation registered"
        );
        self.invitations.register(&invitation, message);
        Ok(true)
    }

    fn check_party(&self, party_key: &PublicKey) -> Result<()> {
        if party_key != &self.public_key {
            return Err(Error::WrongParty(
                party_key.to_string(),
                self.public_key.to_string(),
            ));
        }
        Ok(())
    }

    /// First signer of the outermost layer that is a current
    /// member or the party key itself.
    async fn trusted_signer(
        &self,
        message: &SignedMessage,
    ) -> Option<PublicKey> {
        for key in message.signing_keys() {
            if key == self.public_key || self.is_member(&key) {
                return Some(key);
            }
        }
        None
    }

    /// Resolve the member that authorizes an admission.
    ///
    /// For enveloped credentials the envelope signer is the
    /// authority; a direct credential needs a co-signer that is
    /// already a member.
    fn admit_authority(
        &self,
        outer: &SignedMessage,
        admitted: &PublicKey,
        enveloped: bool,
        outer_authority: Option<PublicKey>,
    ) -> Option<PublicKey> {
        if enveloped {
            return outer_authority;
        }
        outer
            .signing_keys()
            .into_iter()
            .find(|key| key != admitted && self.is_member(key))
    }

    async fn admit_key(
        &mut self,
        key: PublicKey,
        key_type: KeyType,
        authority: PublicKey,
        message: &SignedMessage,
    ) -> Result<()> {
        if self.is_member(&key) {
            tracing::debug!(
                party = %self.public_key,
                key = %key,
                "key already admitted"
            );
            return Ok(());
        }
        let record = self.install_record(key, key_type).await?;
        self.member_keys.push(key);
        self.admitted_by.insert(key, authority);
        self.credential_messages.insert(key, message.clone());
        let _ = self.events.send(PartyEvent::AdmitKey(record));
        Ok(())
    }

    async fn admit_feed(
        &mut self,
        key: PublicKey,
        authority: PublicKey,
        message: &SignedMessage,
    ) -> Result<()> {
        if self.is_member_feed(&key) {
            tracing::debug!(
                party = %self.public_key,
                feed = %key,
                "feed already admitted"
            );
            return Ok(());
        }
        let record =
            self.install_record(key, KeyType::Feed).await?;
        self.member_feeds.push(key);
        self.admitted_by.insert(key, authority);
        self.credential_messages.insert(key, message.clone());
        let _ = self.events.send(PartyEvent::AdmitFeed(record));
        Ok(())
    }

    /// Add or confirm the keyring record for an admitted key.
    ///
    /// An existing hint record becomes trusted and loses its
    /// hint flag.
    async fn install_record(
        &mut self,
        key: PublicKey,
        key_type: KeyType,
    ) -> Result<KeyRecord> {
        if let Some(existing) = self.keyring.get(&key).await {
            let mut update = existing;
            let was_hint = update.hint;
            update.key_type = key_type;
            update.hint = false;
            update.trusted = true;
            let record = self.keyring.update_key(update).await?;
            if was_hint {
                let _ = self
                    .events
                    .send(PartyEvent::UpdateKey(record.clone()));
            }
            Ok(record)
        } else {
            let record =
                KeyRecord::public_record(key_type, key);
            self.keyring
                .add_public_key(record.clone())
                .await?;
            Ok(record)
        }
    }
}
