use thiserror::Error;

/// Errors generated by the keyring library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated attempting to add a key that already
    /// exists without the overwrite flag.
    #[error(r#"key "{0}" already exists"#)]
    KeyExists(String),

    /// Error generated when a key record could not be found.
    #[error(r#"key "{0}" not found"#)]
    KeyNotFound(String),

    /// Error generated when a public-only record carries a
    /// secret key.
    #[error("secret keys are not accepted on this path")]
    SecretNotAllowed,

    /// Error generated when signing requires a secret key that
    /// the keyring does not hold.
    #[error(r#"no secret key held for "{0}""#)]
    SecretMissing(String),

    /// Error generated when a chain signer's tip does not match
    /// any secret-bearing record.
    #[error(r#"key chain tip "{0}" has no signing secret"#)]
    ChainTipSecretMissing(String),

    /// Error generated when no admission message exists for a
    /// key while building a key chain.
    #[error(r#"no admission message for key "{0}""#)]
    ChainMessageMissing(String),

    /// Error generated when an admission message is not signed
    /// by the key it is expected to admit.
    #[error(r#"message does not admit key "{0}""#)]
    ChainKeyNotSigner(String),

    /// Error generated when a key chain node carries a message
    /// whose signatures do not verify.
    ///
    /// The chain must be treated as hostile.
    #[error(r#"invalid message in key chain at "{0}""#)]
    ChainMessageInvalid(String),

    /// Error generated when chain walking encounters a key that
    /// is present but quarantined.
    ///
    /// Trust is never laundered through a quarantined node; the
    /// chain must be treated as hostile.
    #[error(r#"untrusted key "{0}" encountered in key chain"#)]
    UntrustedKeyInChain(String),

    /// Error generated when the root-forward replay of a key
    /// chain fails to verify a message.
    ///
    /// The chain must be treated as hostile.
    #[error(r#"key chain replay failed at "{0}""#)]
    ChainReplayFailed(String),

    /// Error generated by the protocol library.
    #[error(transparent)]
    Protocol(#[from] conclave_protocol::Error),

    /// Error generated by signing key material.
    #[error(transparent)]
    Signature(#[from] ed25519_dalek::SignatureError),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error generated by input/output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error signals a hostile chain or corrupted
    /// key material rather than a recoverable mismatch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ChainMessageInvalid(_)
                | Error::UntrustedKeyInChain(_)
                | Error::ChainReplayFailed(_)
        )
    }
}
