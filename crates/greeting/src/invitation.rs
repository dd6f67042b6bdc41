//! Greeter-side invitation state.
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};

use conclave_protocol::{InvitationId, PublicKey, NONCE_LEN};

/// Observable state of an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationState {
    /// Created, no command received.
    Initial,
    /// BEGIN accepted.
    Began,
    /// HANDSHAKE accepted.
    Handshook,
    /// NOTARIZE accepted.
    Notarized,
    /// FINISH received.
    Finished,
    /// Explicitly revoked.
    Revoked,
    /// Wall-clock expiration passed.
    Expired,
}

/// Ephemeral greeter-side state for a single invitation.
///
/// Transitions are fired exclusively by inbound commands; the
/// session guards each transition against the prior state and
/// the out-of-band secret.
#[derive(Debug)]
pub struct Invitation {
    id: InvitationId,
    party_key: PublicKey,
    nonce: Vec<u8>,
    auth_nonce: Vec<u8>,
    expiration: Option<DateTime<Utc>>,
    secret: Option<Vec<u8>>,
    began: Option<DateTime<Utc>>,
    handshook: Option<DateTime<Utc>>,
    notarized: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    revoked: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Create an invitation for a party with fresh random
    /// identifier and nonces.
    pub fn new(
        party_key: PublicKey,
        expiration: Option<DateTime<Utc>>,
    ) -> Self {
        let mut nonce = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let mut auth_nonce = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut auth_nonce);
        Self {
            id: InvitationId::new_v4(),
            party_key,
            nonce,
            auth_nonce,
            expiration,
            secret: None,
            began: None,
            handshook: None,
            notarized: None,
            finished: None,
            revoked: None,
        }
    }

    /// Invitation identifier.
    pub fn id(&self) -> &InvitationId {
        &self.id
    }

    /// Party this invitation admits to.
    pub fn party_key(&self) -> &PublicKey {
        &self.party_key
    }

    /// Session nonce that admitted credentials must embed.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Nonce handed to the invitee's secret provider.
    pub fn auth_nonce(&self) -> &[u8] {
        &self.auth_nonce
    }

    /// Secret materialized when the session began.
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    pub(crate) fn set_secret(&mut self, secret: Vec<u8>) {
        self.secret = Some(secret);
    }

    /// Whether the wall-clock expiration has passed.
    pub fn expired(&self) -> bool {
        self.expiration
            .map(|expiration| Utc::now() > expiration)
            .unwrap_or(false)
    }

    /// Whether commands may still be accepted.
    pub fn live(&self) -> bool {
        self.finished.is_none()
            && self.revoked.is_none()
            && !self.expired()
    }

    /// Whether BEGIN was accepted.
    pub fn began(&self) -> bool {
        self.began.is_some()
    }

    /// Whether HANDSHAKE was accepted.
    pub fn handshook(&self) -> bool {
        self.handshook.is_some()
    }

    /// Whether NOTARIZE was accepted.
    pub fn notarized(&self) -> bool {
        self.notarized.is_some()
    }

    /// Whether FINISH was received.
    pub fn finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Derived state of the invitation.
    pub fn state(&self) -> InvitationState {
        if self.revoked.is_some() {
            InvitationState::Revoked
        } else if self.expired() {
            InvitationState::Expired
        } else if self.finished.is_some() {
            InvitationState::Finished
        } else if self.notarized.is_some() {
            InvitationState::Notarized
        } else if self.handshook.is_some() {
            InvitationState::Handshook
        } else if self.began.is_some() {
            InvitationState::Began
        } else {
            InvitationState::Initial
        }
    }

    /// Revoke the invitation.
    pub fn revoke(&mut self) {
        self.revoked = Some(Utc::now());
    }

    pub(crate) fn mark_began(&mut self) {
        self.began = Some(Utc::now());
    }

    pub(crate) fn mark_handshook(&mut self) {
        self.handshook = Some(Utc::now());
    }

    pub(crate) fn mark_notarized(&mut self) {
        self.notarized = Some(Utc::now());
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = Some(Utc::now());
    }
}
