//! Constants used by the conclave protocol.

/// Length in bytes of a public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length in bytes of a secret key.
pub const SECRET_KEY_LEN: usize = 64;

/// Length in bytes of a detached signature.
pub const SIGNATURE_LEN: usize = 64;

/// Length in bytes of a message nonce.
pub const NONCE_LEN: usize = 32;
