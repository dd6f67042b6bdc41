//! Key material primitives shared across the workspace.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result, PUBLIC_KEY_LEN, SECRET_KEY_LEN};

/// Public key for an ed25519 key pair.
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct PublicKey(
    #[serde(with = "hex::serde")] [u8; PUBLIC_KEY_LEN],
);

impl PublicKey {
    /// Bytes of this public key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Copy the key bytes into a vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<[u8; PUBLIC_KEY_LEN]> for PublicKey {
    fn from(value: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        let bytes: [u8; PUBLIC_KEY_LEN] = value
            .try_into()
            .map_err(|_| Error::BadPublicKeyLength(value.len()))?;
        Ok(Self(bytes))
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::str::FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|_| Error::BadPublicKeyLength(0))?;
        bytes.as_slice().try_into()
    }
}

/// Secret half of an ed25519 key pair.
///
/// Secrets are owned by a keyring and never leave it except by
/// explicit export; the debug representation is redacted.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(
    #[serde(with = "hex::serde")] [u8; SECRET_KEY_LEN],
);

impl SecretKey {
    /// Bytes of this secret key.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.0
    }
}

impl From<[u8; SECRET_KEY_LEN]> for SecretKey {
    fn from(value: [u8; SECRET_KEY_LEN]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for SecretKey {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        let bytes: [u8; SECRET_KEY_LEN] = value
            .try_into()
            .map_err(|_| Error::BadSecretKeyLength(value.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

/// Type of key described by a key record.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Key of unknown provenance.
    #[default]
    Unknown,
    /// Identity key for a person or agent.
    Identity,
    /// Device key belonging to an identity.
    Device,
    /// Key identifying a party.
    Party,
    /// Key identifying an append-only feed.
    Feed,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Unknown => "unknown",
                Self::Identity => "identity",
                Self::Device => "device",
                Self::Party => "party",
                Self::Feed => "feed",
            }
        )
    }
}

impl std::str::FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "unknown" => Self::Unknown,
            "identity" => Self::Identity,
            "device" => Self::Device,
            "party" => Self::Party,
            "feed" => Self::Feed,
            _ => {
                return Err(Error::UnknownKeyType(s.to_owned()))
            }
        })
    }
}
