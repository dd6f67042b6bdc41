use thiserror::Error;

/// Errors generated by the party library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a second genesis credential arrives
    /// for a party.
    #[error("genesis already processed for this party")]
    GenesisAlreadyProcessed,

    /// Error generated when a genesis credential fails its
    /// signature requirements.
    ///
    /// A malformed genesis aborts ingestion for the party.
    #[error("invalid genesis credential: {0}")]
    GenesisInvalid(String),

    /// Error generated when a credential names a different party.
    #[error(r#"credential for party "{0}" received by party "{1}""#)]
    WrongParty(String, String),

    /// Error generated when a credential carries an invalid
    /// signature.
    #[error("credential signature failed verification")]
    SignatureInvalid,

    /// Error generated when a credential is not signed by the
    /// key it admits.
    #[error(r#"credential is not self-signed by "{0}""#)]
    NotSelfSigned(String),

    /// Error generated when no signer of a credential is a
    /// trusted member.
    ///
    /// Recoverable: the message may be ahead of its admitting
    /// credential in the merged stream.
    #[error("credential has no trusted signer")]
    NoTrustedSigner,

    /// Error generated when a payload cannot appear in a party
    /// log.
    #[error(r#"unexpected payload "{0}" in party log"#)]
    UnexpectedPayload(String),

    /// Error generated when peer credentials do not bind to a
    /// member of the party.
    ///
    /// Rejection closes the transport.
    #[error("peer credentials rejected: {0}")]
    AuthRejected(String),

    /// Error generated when an auth payload is malformed.
    #[error("malformed auth payload: {0}")]
    AuthGeneral(String),

    /// Error generated by the keyring library.
    #[error(transparent)]
    Keyring(#[from] conclave_keyring::Error),

    /// Error generated by the protocol library.
    #[error(transparent)]
    Protocol(#[from] conclave_protocol::Error),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
