use std::path::PathBuf;
use thiserror::Error;

/// Errors generated by the conclave library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a config path is not a file.
    #[error("path {0} is not a file")]
    NotFile(PathBuf),

    /// Error generated when the greeting command timeout is
    /// zero.
    #[error("greeting command-timeout must not be zero")]
    CommandTimeoutConfig,

    /// Error generated when the auth freshness window is
    /// inverted or empty.
    #[error("auth max-age must not be zero")]
    AuthWindowConfig,

    /// Error generated when a party is not open.
    #[error(r#"party "{0}" is not open"#)]
    PartyNotOpen(String),

    /// Error generated when a party is already open.
    #[error(r#"party "{0}" is already open"#)]
    PartyAlreadyOpen(String),

    /// Error generated when the device keyring holds no
    /// identity key.
    #[error("no identity key in the device keyring")]
    NoIdentityKey,

    /// Error generated by the protocol library.
    #[error(transparent)]
    Protocol(#[from] conclave_protocol::Error),

    /// Error generated by the keyring library.
    #[error(transparent)]
    Keyring(#[from] conclave_keyring::Error),

    /// Error generated by the party library.
    #[error(transparent)]
    Party(#[from] conclave_party::Error),

    /// Error generated by the greeting library.
    #[error(transparent)]
    Greeting(#[from] conclave_greeting::Error),

    /// Error generated parsing TOML configuration.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// Error generated by input/output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
