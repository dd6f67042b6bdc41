use thiserror::Error;

/// Errors generated by the protocol library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error generated when a public key has the wrong length.
    #[error("bad public key length {0}, expected 32 bytes")]
    BadPublicKeyLength(usize),

    /// Error generated when a secret key has the wrong length.
    #[error("bad secret key length {0}, expected 64 bytes")]
    BadSecretKeyLength(usize),

    /// Error generated when a signature has the wrong length.
    #[error("bad signature length {0}, expected 64 bytes")]
    BadSignatureLength(usize),

    /// Error generated when a key type string is not recognised.
    #[error(r#"unknown key type "{0}""#)]
    UnknownKeyType(String),

    /// Error generated when a payload contains a floating point
    /// value, which has no canonical byte image.
    #[error("floating point values are not permitted in payloads")]
    FloatNotCanonical,

    /// Error generated when a frame does not open with the
    /// conclave magic bytes.
    #[error("bad magic bytes, this is not a conclave frame")]
    BadFrameMagic,

    /// Error generated when a buffer is too short to hold a
    /// frame header.
    #[error("frame of {0} bytes is too short for a header")]
    FrameTooShort(usize),

    /// Error generated when a frame version is not supported.
    #[error("unsupported frame version {1}, expected {0}")]
    FrameVersion(u8, u8),

    /// Error generated when a frame travels in the wrong
    /// direction, for example a command read as a response.
    #[error("unexpected frame kind {actual}, expected {expected}")]
    FrameKind {
        /// Direction marker the decoder was asked for.
        expected: u8,
        /// Direction marker found in the header.
        actual: u8,
    },

    /// Error generated when a length prefix exceeds the frame
    /// limit.
    #[error("block of {0} bytes exceeds the frame limit")]
    OversizeBlock(usize),

    /// Error generated when an encoding type identifier is
    /// not recognised.
    #[error("unknown encoding type identifier {0}")]
    EncodingKind(u8),

    /// Error generated when a reject reason code is not recognised.
    #[error("unknown reject reason code {0}")]
    UnknownRejectReason(u8),

    /// Error generated when an operation receives a message whose
    /// payload variant it cannot process.
    #[error(r#"unexpected payload type "{0}""#)]
    UnexpectedPayload(String),

    /// Error generated by the JSON library.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error generated by input/output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
