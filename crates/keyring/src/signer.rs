//! Signing capability passed to [crate::Keyring::sign].
use conclave_protocol::{KeyChain, PublicKey};

use crate::KeyRecord;

/// A key-like value that can contribute a signature.
///
/// Either a key record whose secret the keyring holds, or a key
/// chain whose tip key maps to such a record.
#[derive(Debug, Clone)]
pub enum Signer {
    /// Sign directly with a key record.
    Record(KeyRecord),
    /// Sign with the tip key of a chain, attaching the chain to
    /// the produced signature.
    Chain(KeyChain),
}

impl Signer {
    /// Public key the signature will be attributed to.
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Record(record) => record.public_key,
            Self::Chain(chain) => chain.public_key,
        }
    }

    /// Key chain attached to the produced signature, if any.
    pub fn key_chain(&self) -> Option<&KeyChain> {
        match self {
            Self::Record(_) => None,
            Self::Chain(chain) => Some(chain),
        }
    }
}

impl From<KeyRecord> for Signer {
    fn from(value: KeyRecord) -> Self {
        Self::Record(value)
    }
}

impl From<KeyChain> for Signer {
    fn from(value: KeyChain) -> Self {
        Self::Chain(value)
    }
}
