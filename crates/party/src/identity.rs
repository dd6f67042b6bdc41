//! Identity and device information attached to a party.
use std::collections::HashMap;

use conclave_protocol::{Payload, PublicKey, SignedMessage};

/// Holds the latest identity-info and device-info message for
/// each member key.
#[derive(Debug, Default)]
pub struct IdentityProcessor {
    info_messages: HashMap<PublicKey, SignedMessage>,
}

impl IdentityProcessor {
    /// Store an info message for a subject key.
    ///
    /// The newest message wins; callers have already verified
    /// the signature and membership of the subject.
    pub(crate) fn record(
        &mut self,
        subject: PublicKey,
        message: SignedMessage,
    ) {
        self.info_messages.insert(subject, message);
    }

    /// Info message stored for a key.
    pub fn info_message(
        &self,
        key: &PublicKey,
    ) -> Option<&SignedMessage> {
        self.info_messages.get(key)
    }

    /// Display name recorded for a key.
    pub fn display_name(&self, key: &PublicKey) -> Option<&str> {
        match self.info_messages.get(key)?.payload() {
            Payload::IdentityInfo(info) => {
                Some(info.display_name.as_str())
            }
            Payload::DeviceInfo(info) => {
                Some(info.display_name.as_str())
            }
            _ => None,
        }
    }

    /// Subject key named by an info payload.
    pub(crate) fn subject(payload: &Payload) -> Option<PublicKey> {
        match payload {
            Payload::IdentityInfo(info) => {
                Some(info.identity_key)
            }
            Payload::DeviceInfo(info) => Some(info.device_key),
            _ => None,
        }
    }
}
