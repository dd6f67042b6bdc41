use conclave_keyring::KeyRecord;
use conclave_protocol::PublicKey;

/// Events dispatched by a party as its membership changes.
///
/// One broadcast channel per party; events are delivered in the
/// order their triggering messages committed.
#[derive(Debug, Clone)]
pub enum PartyEvent {
    /// A new member key was admitted.
    AdmitKey(KeyRecord),
    /// A new feed was admitted.
    AdmitFeed(KeyRecord),
    /// An existing key record changed, for example a hint that
    /// was confirmed by its admission message.
    UpdateKey(KeyRecord),
    /// Identity or device information was updated for a member.
    IdentityInfoUpdated(PublicKey),
}
