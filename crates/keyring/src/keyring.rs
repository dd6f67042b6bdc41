//! Keyring owning key records and computing signatures.
use chrono::Utc;
use ed25519::signature::{Signer as _, Verifier as _};
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

use conclave_protocol::{
    KeyChain, KeyType, MessageData, MessageSignature, Payload,
    PublicKey, SecretKey, SignedMessage, NONCE_LEN,
};

use crate::{
    chain, Error, KeyRecord, KeyStore, MemoryKeyStore, Result,
    Signer,
};

/// Options controlling message verification.
#[derive(Debug, Default, Clone, Copy)]
pub struct VerifyOptions {
    /// Require every signature to resolve to a trusted key
    /// rather than at least one.
    pub require_all_trusted: bool,
    /// Allow signatures to prove trust through a key chain.
    pub allow_key_chains: bool,
}

impl VerifyOptions {
    /// Require at least one trusted signature.
    pub fn any_trusted() -> Self {
        Default::default()
    }

    /// Require every signature to be trusted.
    pub fn all_trusted() -> Self {
        Self {
            require_all_trusted: true,
            allow_key_chains: false,
        }
    }
}

/// Typed keystore with signing, verification and trust walking.
///
/// Reads are concurrent; writes go through the backing store
/// before they are visible, so a record is never observable
/// without having been persisted.
#[derive(Clone)]
pub struct Keyring {
    store: Arc<dyn KeyStore>,
    records: Arc<RwLock<HashMap<PublicKey, KeyRecord>>>,
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring {
    /// Create a keyring over an in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryKeyStore::new()),
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open a keyring over a persistent store, loading all
    /// existing records.
    pub async fn open(store: Arc<dyn KeyStore>) -> Result<Self> {
        let mut records = HashMap::new();
        for record in store.list().await? {
            records.insert(record.public_key, record);
        }
        Ok(Self {
            store,
            records: Arc::new(RwLock::new(records)),
        })
    }

    /// Generate a key pair of the given type and add it to the
    /// ring.
    ///
    /// The returned record is redacted; the secret stays in the
    /// ring.
    pub async fn generate(
        &self,
        key_type: KeyType,
    ) -> Result<KeyRecord> {
        let record = KeyRecord::generate(key_type);
        self.add_key_record(record.clone(), false).await?;
        Ok(record.redacted())
    }

    /// Add a full key record holding both halves of a key pair.
    ///
    /// Refuses to overwrite an existing record unless
    /// `overwrite` is set.
    pub async fn add_key_record(
        &self,
        record: KeyRecord,
        overwrite: bool,
    ) -> Result<()> {
        if !record.has_secret() {
            return Err(Error::SecretMissing(
                record.public_key.to_string(),
            ));
        }
        self.insert(record, overwrite).await
    }

    /// Add a record for a public key only.
    pub async fn add_public_key(
        &self,
        record: KeyRecord,
    ) -> Result<()> {
        if record.has_secret() {
            return Err(Error::SecretNotAllowed);
        }
        self.insert(record, false).await
    }

    async fn insert(
        &self,
        mut record: KeyRecord,
        overwrite: bool,
    ) -> Result<()> {
        record.own = record.has_secret();
        {
            let reader = self.records.read().await;
            if !overwrite
                && reader.contains_key(&record.public_key)
            {
                return Err(Error::KeyExists(
                    record.public_key.to_string(),
                ));
            }
        }
        self.store.upsert(&record).await?;
        let mut writer = self.records.write().await;
        writer.insert(record.public_key, record);
        Ok(())
    }

    /// Merge non-secret attributes into an existing record.
    ///
    /// A typed record never reverts to [KeyType::Unknown], and a
    /// confirmed record clears its hint flag.
    pub async fn update_key(
        &self,
        record: KeyRecord,
    ) -> Result<KeyRecord> {
        let updated = {
            let reader = self.records.read().await;
            let existing = reader
                .get(&record.public_key)
                .ok_or_else(|| {
                    Error::KeyNotFound(
                        record.public_key.to_string(),
                    )
                })?;
            let mut updated = existing.clone();
            if record.key_type != KeyType::Unknown {
                updated.key_type = record.key_type;
            }
            updated.hint = record.hint;
            updated.trusted = record.trusted;
            updated
        };
        self.store.upsert(&updated).await?;
        let mut writer = self.records.write().await;
        writer.insert(updated.public_key, updated.clone());
        Ok(updated.redacted())
    }

    /// Strip the secret from a record, leaving the public half.
    pub async fn delete_secret_key(
        &self,
        public_key: &PublicKey,
    ) -> Result<()> {
        let updated = {
            let reader = self.records.read().await;
            let existing =
                reader.get(public_key).ok_or_else(|| {
                    Error::KeyNotFound(public_key.to_string())
                })?;
            let mut updated = existing.clone();
            updated.secret_key = None;
            updated.own = false;
            updated
        };
        self.store.upsert(&updated).await?;
        let mut writer = self.records.write().await;
        writer.insert(updated.public_key, updated);
        Ok(())
    }

    /// Remove a record entirely.
    pub async fn delete_key(
        &self,
        public_key: &PublicKey,
    ) -> Result<()> {
        self.store.remove(public_key).await?;
        let mut writer = self.records.write().await;
        writer.remove(public_key);
        Ok(())
    }

    /// Export the secret key for a record.
    pub async fn export_secret(
        &self,
        public_key: &PublicKey,
    ) -> Result<SecretKey> {
        let reader = self.records.read().await;
        reader
            .get(public_key)
            .and_then(|record| record.secret_key.clone())
            .ok_or_else(|| {
                Error::SecretMissing(public_key.to_string())
            })
    }

    /// Get a record with the secret redacted.
    pub async fn get(
        &self,
        public_key: &PublicKey,
    ) -> Option<KeyRecord> {
        let reader = self.records.read().await;
        reader.get(public_key).map(KeyRecord::redacted)
    }

    /// Whether the ring holds a record for a key.
    pub async fn contains(&self, public_key: &PublicKey) -> bool {
        let reader = self.records.read().await;
        reader.contains_key(public_key)
    }

    /// Whether a key is directly trusted by this ring.
    pub async fn is_trusted(
        &self,
        public_key: &PublicKey,
    ) -> bool {
        let reader = self.records.read().await;
        reader
            .get(public_key)
            .map(|record| record.trusted)
            .unwrap_or(false)
    }

    /// All records with secrets redacted.
    pub async fn records(&self) -> Vec<KeyRecord> {
        let reader = self.records.read().await;
        reader.values().map(KeyRecord::redacted).collect()
    }

    /// Records of a given type with secrets redacted.
    pub async fn find_by_type(
        &self,
        key_type: KeyType,
    ) -> Vec<KeyRecord> {
        let reader = self.records.read().await;
        reader
            .values()
            .filter(|record| record.key_type == key_type)
            .map(KeyRecord::redacted)
            .collect()
    }

    /// Sign a payload with one or more signers.
    ///
    /// Every signer must be a key record whose secret this ring
    /// holds or a key chain whose tip key does. The nonce
    /// defaults to fresh random bytes and the timestamp to the
    /// current time.
    pub async fn sign(
        &self,
        payload: Payload,
        signers: &[Signer],
        nonce: Option<Vec<u8>>,
        created: Option<String>,
    ) -> Result<SignedMessage> {
        let nonce = nonce.unwrap_or_else(|| {
            let mut nonce = vec![0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            nonce
        });
        let created =
            created.unwrap_or_else(|| Utc::now().to_rfc3339());

        let signed = MessageData {
            created,
            nonce,
            payload,
        };
        let image = conclave_protocol::canonical_bytes(&signed)?;

        let reader = self.records.read().await;
        let mut signatures = Vec::with_capacity(signers.len());
        for signer in signers {
            let public_key = signer.public_key();
            let secret = signer_secret(&reader, signer)?;
            let signing_key = SigningKey::from_keypair_bytes(
                secret.as_bytes(),
            )?;
            let signature = signing_key.sign(&image);
            signatures.push(MessageSignature {
                key: public_key,
                signature: signature.to_bytes().to_vec(),
                key_chain: signer.key_chain().cloned(),
            });
        }

        Ok(SignedMessage { signed, signatures })
    }

    /// Verify a signed message.
    ///
    /// Every signature must verify cryptographically over the
    /// canonical image. Trust is then counted per signature:
    /// directly trusted keys always count, and chain-backed
    /// signatures count when `allow_key_chains` is set and the
    /// chain resolves to a trusted key.
    pub async fn verify(
        &self,
        message: &SignedMessage,
        options: VerifyOptions,
    ) -> Result<bool> {
        if message.signatures.is_empty() {
            return Ok(false);
        }
        if !validate_signatures(message)? {
            return Ok(false);
        }

        let reader = self.records.read().await;
        let mut trusted = 0;
        for signature in &message.signatures {
            let direct = reader
                .get(&signature.key)
                .map(|record| record.trusted)
                .unwrap_or(false);
            if direct {
                trusted += 1;
                continue;
            }
            if options.allow_key_chains {
                if let Some(key_chain) = &signature.key_chain {
                    if key_chain.public_key == signature.key
                        && chain::find_trusted(&reader, key_chain)?
                            .is_some()
                    {
                        trusted += 1;
                    }
                }
            }
        }

        Ok(if options.require_all_trusted {
            trusted == message.signatures.len()
        } else {
            trusted >= 1
        })
    }

    /// Walk a key chain for a record trusted by this ring.
    pub async fn find_trusted(
        &self,
        key_chain: &KeyChain,
    ) -> Result<Option<KeyRecord>> {
        let reader = self.records.read().await;
        chain::find_trusted(&reader, key_chain)
    }
}

fn signer_secret(
    records: &HashMap<PublicKey, KeyRecord>,
    signer: &Signer,
) -> Result<SecretKey> {
    match signer {
        Signer::Record(record) => record
            .secret_key
            .clone()
            .or_else(|| {
                records
                    .get(&record.public_key)
                    .and_then(|held| held.secret_key.clone())
            })
            .ok_or_else(|| {
                Error::SecretMissing(
                    record.public_key.to_string(),
                )
            }),
        Signer::Chain(chain) => records
            .get(&chain.public_key)
            .and_then(|record| record.secret_key.clone())
            .ok_or_else(|| {
                Error::ChainTipSecretMissing(
                    chain.public_key.to_string(),
                )
            }),
    }
}

/// Validate every signature on a message cryptographically.
///
/// Returns false for any recoverable mismatch: a malformed key
/// or signature, or a signature that does not cover the
/// canonical image of the message body.
pub fn validate_signatures(
    message: &SignedMessage,
) -> Result<bool> {
    let image = message.data_bytes()?;
    for signature in &message.signatures {
        let Ok(verifying_key) =
            VerifyingKey::from_bytes(signature.key.as_bytes())
        else {
            return Ok(false);
        };
        let Ok(signature) =
            Signature::from_slice(&signature.signature)
        else {
            return Ok(false);
        };
        if verifying_key.verify(&image, &signature).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use conclave_protocol::KeyAdmit;

    fn admit_payload(admit_key: PublicKey) -> Payload {
        Payload::KeyAdmit(KeyAdmit {
            party_key: [1u8; 32].into(),
            admit_key,
            admit_key_type: KeyType::Device,
        })
    }

    #[tokio::test]
    async fn sign_verify_round_trip() -> Result<()> {
        let ring = Keyring::new();
        let key = ring.generate(KeyType::Identity).await?;
        let message = ring
            .sign(
                admit_payload(key.public_key),
                &[Signer::Record(key.clone())],
                None,
                None,
            )
            .await?;
        assert!(
            ring.verify(&message, VerifyOptions::any_trusted())
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_tampered_nonce() -> Result<()> {
        let ring = Keyring::new();
        let key = ring.generate(KeyType::Feed).await?;
        let mut message = ring
            .sign(
                admit_payload(key.public_key),
                &[Signer::Record(key)],
                None,
                None,
            )
            .await?;
        message.signed.nonce = b"wrong".to_vec();
        assert!(!validate_signatures(&message)?);
        assert!(
            !ring
                .verify(&message, VerifyOptions::any_trusted())
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_counts_trusted_signatures() -> Result<()> {
        let ours = Keyring::new();
        let theirs = Keyring::new();
        let our_key = ours.generate(KeyType::Identity).await?;
        let their_key =
            theirs.generate(KeyType::Identity).await?;

        // Sign with both; our ring only trusts its own key.
        let their_secret = theirs
            .export_secret(&their_key.public_key)
            .await?;
        let mut foreign = their_key.clone();
        foreign.secret_key = Some(their_secret);
        let message = ours
            .sign(
                admit_payload(our_key.public_key),
                &[
                    Signer::Record(our_key),
                    Signer::Record(foreign),
                ],
                None,
                None,
            )
            .await?;

        assert!(
            ours.verify(&message, VerifyOptions::any_trusted())
                .await?
        );
        assert!(
            !ours
                .verify(&message, VerifyOptions::all_trusted())
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn add_key_record_refuses_overwrite() -> Result<()> {
        let ring = Keyring::new();
        let record = KeyRecord::generate(KeyType::Device);
        ring.add_key_record(record.clone(), false).await?;
        let result =
            ring.add_key_record(record.clone(), false).await;
        assert!(matches!(result, Err(Error::KeyExists(_))));
        ring.add_key_record(record, true).await?;
        Ok(())
    }

    #[tokio::test]
    async fn update_key_keeps_specific_type() -> Result<()> {
        let ring = Keyring::new();
        let key = ring.generate(KeyType::Device).await?;

        let mut update = key.clone();
        update.key_type = KeyType::Unknown;
        let updated = ring.update_key(update).await?;
        assert_eq!(KeyType::Device, updated.key_type);
        Ok(())
    }

    #[tokio::test]
    async fn delete_secret_key_keeps_public_record(
    ) -> Result<()> {
        let ring = Keyring::new();
        let key = ring.generate(KeyType::Party).await?;
        ring.delete_secret_key(&key.public_key).await?;

        let record = ring
            .get(&key.public_key)
            .await
            .expect("record should exist");
        assert!(!record.own);
        assert!(
            ring.export_secret(&key.public_key).await.is_err()
        );
        Ok(())
    }

    #[tokio::test]
    async fn public_accessors_never_expose_secrets(
    ) -> Result<()> {
        let ring = Keyring::new();
        let key = ring.generate(KeyType::Identity).await?;
        assert!(key.secret_key.is_none());
        let record = ring.get(&key.public_key).await.unwrap();
        assert!(record.secret_key.is_none());
        for record in ring.records().await {
            assert!(record.secret_key.is_none());
        }
        Ok(())
    }
}
