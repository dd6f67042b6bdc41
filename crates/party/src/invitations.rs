//! Registry of offline invitations written into a party log.
use std::collections::HashMap;

use conclave_protocol::{
    InvitationId, PartyInvitation, Payload, PublicKey,
    SignedMessage,
};

/// Tracks live party-invitation messages keyed by invitation id
/// and by invitee key.
#[derive(Debug, Default)]
pub struct InvitationRegistry {
    by_id: HashMap<InvitationId, SignedMessage>,
    by_invitee: HashMap<PublicKey, InvitationId>,
}

impl InvitationRegistry {
    /// Register an invitation message.
    pub(crate) fn register(
        &mut self,
        invitation: &PartyInvitation,
        message: SignedMessage,
    ) {
        self.by_invitee
            .insert(invitation.invitee_key, invitation.id);
        self.by_id.insert(invitation.id, message);
    }

    /// Message that wrote an invitation.
    pub fn message(
        &self,
        id: &InvitationId,
    ) -> Option<&SignedMessage> {
        self.by_id.get(id)
    }

    /// Invitation payload for an identifier.
    pub fn invitation(
        &self,
        id: &InvitationId,
    ) -> Option<PartyInvitation> {
        match self.by_id.get(id)?.payload() {
            Payload::PartyInvitation(invitation) => {
                Some(invitation.clone())
            }
            _ => None,
        }
    }

    /// Invitation bound to an invitee key.
    pub fn find_by_invitee(
        &self,
        invitee_key: &PublicKey,
    ) -> Option<PartyInvitation> {
        let id = self.by_invitee.get(invitee_key)?;
        self.invitation(id)
    }

    /// Number of registered invitations.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no invitations are registered.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
