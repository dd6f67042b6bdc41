//! Key records owned by a keyring.
use chrono::Utc;
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use conclave_protocol::{KeyType, PublicKey, SecretKey};

fn default_trusted() -> bool {
    true
}

/// Record for a single key pair or public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Type of key this record describes.
    #[serde(rename = "type")]
    pub key_type: KeyType,

    /// Public key identifying the record.
    pub public_key: PublicKey,

    /// Secret key, present only for keys we generated or
    /// imported ourselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<SecretKey>,

    /// Whether the record was added provisionally via a
    /// greeting hint and has not yet been confirmed by a signed
    /// admission.
    #[serde(default)]
    pub hint: bool,

    /// Whether we hold the secret for this key.
    #[serde(default)]
    pub own: bool,

    /// Whether the key is trusted; cleared to quarantine a key.
    #[serde(default = "default_trusted")]
    pub trusted: bool,

    /// RFC-3339 timestamp when the record was added to the ring.
    pub added: String,

    /// RFC-3339 timestamp when the key was created.
    pub created: String,
}

impl KeyRecord {
    /// Generate a new key pair of the given type.
    pub fn generate(key_type: KeyType) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let now = Utc::now().to_rfc3339();
        Self {
            key_type,
            public_key: signing_key.verifying_key().to_bytes().into(),
            secret_key: Some(
                signing_key.to_keypair_bytes().into(),
            ),
            hint: false,
            own: true,
            trusted: true,
            added: now.clone(),
            created: now,
        }
    }

    /// Create a record for a public key we do not own.
    pub fn public_record(
        key_type: KeyType,
        public_key: PublicKey,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            key_type,
            public_key,
            secret_key: None,
            hint: false,
            own: false,
            trusted: true,
            added: now.clone(),
            created: now,
        }
    }

    /// Create a provisional hint record.
    ///
    /// Hints are untrusted until a signed admission confirms
    /// them.
    pub fn hint_record(
        key_type: KeyType,
        public_key: PublicKey,
    ) -> Self {
        let mut record = Self::public_record(key_type, public_key);
        record.hint = true;
        record.trusted = false;
        record
    }

    /// Whether the record holds a secret key.
    pub fn has_secret(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Copy of this record with the secret stripped.
    pub fn redacted(&self) -> KeyRecord {
        let mut record = self.clone();
        record.secret_key = None;
        record
    }
}
