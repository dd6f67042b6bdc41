//! Credential message types, canonical signing image and binary
//! encoding for the conclave membership core.

#![deny(missing_docs)]

mod canonical;
mod command;
mod constants;
mod credential;
pub mod encoding;
mod error;
mod keys;
mod message;

pub use canonical::{canonical_bytes, RESERVED_PREFIX};
pub use command::*;
pub use constants::*;
pub use credential::*;
pub use error::Error;
pub use keys::*;
pub use message::*;

pub use hex;
pub use uuid;

/// Result type for the protocol library.
pub type Result<T> = std::result::Result<T, Error>;
