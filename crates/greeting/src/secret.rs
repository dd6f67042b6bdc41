//! Out-of-band secret providers and validators.
use async_trait::async_trait;

use conclave_keyring::{KeyRecord, Keyring, VerifyOptions};
use conclave_protocol::{
    KeyType, Payload, PublicKey, SignedMessage,
};

use crate::{Invitation, Result};

/// Produces the out-of-band secret for a greeting session.
///
/// On the greeter side this materializes the session secret at
/// BEGIN; on the invitee side it answers the auth nonce from the
/// BEGIN response, possibly after prompting a human.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Produce the secret for a session.
    async fn provide(
        &self,
        auth_nonce: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Validates a secret supplied by an invitee against an
/// invitation.
#[async_trait]
pub trait SecretValidator: Send + Sync {
    /// Whether the supplied secret is acceptable.
    async fn validate(
        &self,
        invitation: &Invitation,
        secret: &[u8],
    ) -> bool;
}

/// Fixed secret, for PIN-style out-of-band exchange.
#[derive(Debug, Clone)]
pub struct StaticSecret(Vec<u8>);

impl StaticSecret {
    /// Create a provider for a fixed secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }
}

#[async_trait]
impl SecretProvider for StaticSecret {
    async fn provide(
        &self,
        _auth_nonce: &[u8],
    ) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Compares the supplied secret with the secret materialized
/// when the session began.
#[derive(Debug, Default, Clone, Copy)]
pub struct EqualityValidator;

#[async_trait]
impl SecretValidator for EqualityValidator {
    async fn validate(
        &self,
        invitation: &Invitation,
        secret: &[u8],
    ) -> bool {
        invitation
            .secret()
            .map(|expected| expected == secret)
            .unwrap_or(false)
    }
}

/// Validates a secret that is a signed claim binding the
/// claimant's identity key to the invitee key of a written
/// invitation.
///
/// The claim is verified against a scratch keyring seeded with
/// the invitee key alone, so only the holder of that key can
/// produce an acceptable secret.
#[derive(Debug, Clone)]
pub struct KeyBindingValidator {
    invitee_key: PublicKey,
}

impl KeyBindingValidator {
    /// Create a validator bound to an invitee key.
    pub fn new(invitee_key: PublicKey) -> Self {
        Self { invitee_key }
    }

    /// Check a signed claim against the bound invitee key.
    pub async fn check_claim(
        &self,
        claim: &SignedMessage,
    ) -> bool {
        let Payload::Auth(auth) = claim.payload() else {
            return false;
        };
        if auth.identity_key != self.invitee_key {
            return false;
        }

        let scratch = Keyring::new();
        if scratch
            .add_public_key(KeyRecord::public_record(
                KeyType::Identity,
                self.invitee_key,
            ))
            .await
            .is_err()
        {
            return false;
        }
        let options = VerifyOptions {
            require_all_trusted: false,
            allow_key_chains: true,
        };
        matches!(
            scratch.verify(claim, options).await,
            Ok(true)
        )
    }
}

#[async_trait]
impl SecretValidator for KeyBindingValidator {
    async fn validate(
        &self,
        _invitation: &Invitation,
        secret: &[u8],
    ) -> bool {
        let Ok(claim) =
            serde_json::from_slice::<SignedMessage>(secret)
        else {
            return false;
        };
        self.check_claim(&claim).await
    }
}

/// Secret provider answering with the serialized signed claim,
/// used by a claimant driving an interactive session issued
/// from a written invitation.
#[derive(Debug, Clone)]
pub struct SignedClaimSecret {
    claim: SignedMessage,
}

impl SignedClaimSecret {
    /// Create a provider for a signed claim.
    pub fn new(claim: SignedMessage) -> Self {
        Self { claim }
    }
}

#[async_trait]
impl SecretProvider for SignedClaimSecret {
    async fn provide(
        &self,
        _auth_nonce: &[u8],
    ) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.claim)?)
    }
}
