use thiserror::Error;

use conclave_protocol::RejectReason;

/// Errors generated by the greeting library.
#[derive(Debug, Error)]
pub enum Error {
    /// A command was rejected by a session guard.
    ///
    /// The reason travels on the wire; any rejection tears the
    /// session down.
    #[error("greeting rejected: {0}")]
    Rejected(RejectReason),

    /// Error generated when a command or response does not
    /// arrive within the per-command timeout.
    #[error("greeting command timed out")]
    CommandTimeout,

    /// Error generated when the peer channel closes before the
    /// exchange completes.
    #[error("greeting channel closed")]
    ChannelClosed,

    /// Error generated when the peer answers a command with an
    /// unexpected response variant.
    #[error(r#"unexpected response to "{0}""#)]
    UnexpectedResponse(&'static str),

    /// Error generated when no swarm listener exists for a
    /// rendezvous key.
    #[error(r#"no listener for swarm "{0}""#)]
    SwarmNotFound(String),

    /// Error generated when a session cannot be located for a
    /// peer identifier.
    #[error(r#"no session for peer "{0}""#)]
    SessionNotFound(String),

    /// Error generated by the keyring library.
    #[error(transparent)]
    Keyring(#[from] conclave_keyring::Error),

    /// Error generated by the party library.
    #[error(transparent)]
    Party(#[from] conclave_party::Error),

    /// Error generated by the protocol library.
    #[error(transparent)]
    Protocol(#[from] conclave_protocol::Error),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wire reason for this error, when it is a rejection.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Error::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<RejectReason> for Error {
    fn from(value: RejectReason) -> Self {
        Error::Rejected(value)
    }
}
