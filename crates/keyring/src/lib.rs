//! Typed keystore and signing for the conclave membership core.
//!
//! A [Keyring] owns key records, computes signatures over the
//! canonical image of credential payloads and answers trust
//! questions, either directly or by walking a key chain back to
//! a trusted root.

#![deny(missing_docs)]

mod chain;
mod error;
mod keyring;
mod record;
mod signer;
mod store;

pub use chain::build_key_chain;
pub use error::Error;
pub use keyring::{validate_signatures, Keyring, VerifyOptions};
pub use record::KeyRecord;
pub use signer::Signer;
pub use store::{FileKeyStore, KeyStore, MemoryKeyStore};

/// Result type for the keyring library.
pub type Result<T> = std::result::Result<T, Error>;
