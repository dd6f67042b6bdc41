//! Conclave library.
//!
//! Credential and membership core for a decentralized
//! peer-to-peer collaboration platform: typed keyrings, party
//! membership built from signed credentials, the invitation
//! greeting protocol and handshake authentication.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod manager;

pub use config::{
    AuthConfig, GreetingConfig, ManagerConfig,
};
pub use error::Error;
pub use manager::{PartyHandle, PartyManager};

pub use conclave_greeting as greeting;
pub use conclave_keyring as keyring;
pub use conclave_party as party;
pub use conclave_protocol as protocol;

/// Result type for the conclave library.
pub type Result<T> = std::result::Result<T, Error>;
