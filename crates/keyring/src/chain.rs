//! Building and walking key chains.
//!
//! A key chain proves that a signing key has been transitively
//! endorsed by some other key: each node carries the admission
//! message for its key, and the node's parents are the other
//! keys that signed that admission. Walking a chain tip-to-root
//! against a keyring finds the first node whose key the ring
//! already trusts, then replays the descended branch root-forward
//! to confirm every hop.
use std::collections::{HashMap, HashSet};

use conclave_protocol::{KeyChain, PublicKey, SignedMessage};

use crate::{
    keyring::validate_signatures, Error, KeyRecord, Result,
};

/// Build a key chain for a public key from a map of admission
/// messages.
///
/// `messages` maps each key to the message that admitted it. The
/// exclude list breaks cycles: keys already visited along the
/// current branch are not descended into again. A parent key
/// with no admission message of its own becomes a leaf node
/// carrying the message it co-signed.
pub fn build_key_chain(
    public_key: PublicKey,
    messages: &HashMap<PublicKey, SignedMessage>,
    exclude: &[PublicKey],
) -> Result<KeyChain> {
    let message = messages.get(&public_key).ok_or_else(|| {
        Error::ChainMessageMissing(public_key.to_string())
    })?;

    if !validate_signatures(message)? {
        return Err(Error::ChainMessageInvalid(
            public_key.to_string(),
        ));
    }

    let signing_keys = message.signing_keys();
    if !signing_keys.contains(&public_key) {
        return Err(Error::ChainKeyNotSigner(
            public_key.to_string(),
        ));
    }

    let mut next_exclude = exclude.to_vec();
    next_exclude.extend(signing_keys.iter().copied());

    let mut parents = Vec::new();
    for key in &signing_keys {
        if *key == public_key || exclude.contains(key) {
            continue;
        }
        if messages.contains_key(key) {
            match build_key_chain(*key, messages, &next_exclude) {
                Ok(parent) => parents.push(parent),
                Err(error) => {
                    tracing::debug!(
                        key = %key,
                        error = %error,
                        "skipping chain parent"
                    );
                }
            }
        } else {
            // The parent has no admission of its own; its
            // endorsement is the message it co-signed here.
            parents.push(KeyChain {
                public_key: *key,
                message: Box::new(message.clone()),
                parents: Vec::new(),
            });
        }
    }

    Ok(KeyChain {
        public_key,
        message: Box::new(message.clone()),
        parents,
    })
}

/// Walk a chain tip-to-root looking for a key trusted by the
/// given records.
///
/// Returns the trusted record after replaying the descended
/// branch, the record directly for a trusted tip, or `None` when
/// no node is trusted. A quarantined key anywhere along the walk
/// is fatal; trust is never routed around it.
pub(crate) fn find_trusted(
    records: &HashMap<PublicKey, KeyRecord>,
    chain: &KeyChain,
) -> Result<Option<KeyRecord>> {
    let mut trail = Vec::new();
    walk(records, chain, &mut trail, 0)
}

fn walk(
    records: &HashMap<PublicKey, KeyRecord>,
    node: &KeyChain,
    trail: &mut Vec<SignedMessage>,
    depth: usize,
) -> Result<Option<KeyRecord>> {
    if !validate_signatures(&node.message)? {
        return Err(Error::ChainMessageInvalid(
            node.public_key.to_string(),
        ));
    }
    if !node.message.was_signed_by(&node.public_key) {
        return Err(Error::ChainMessageInvalid(
            node.public_key.to_string(),
        ));
    }

    trail.push((*node.message).clone());

    if let Some(record) = records.get(&node.public_key) {
        if !record.trusted {
            return Err(Error::UntrustedKeyInChain(
                node.public_key.to_string(),
            ));
        }
        // A trusted tip needs no replay.
        if depth == 0 {
            return Ok(Some(record.clone()));
        }
        replay(record, trail)?;
        return Ok(Some(record.clone()));
    }

    for parent in &node.parents {
        if let Some(found) =
            walk(records, parent, trail, depth + 1)?
        {
            return Ok(Some(found));
        }
    }

    trail.pop();
    Ok(None)
}

/// Replay the descended branch root-forward under a scratch ring
/// seeded with the trusted root only.
///
/// Every message must be signed by a key already endorsed by the
/// replay before its own signing keys are endorsed in turn.
fn replay(
    root: &KeyRecord,
    trail: &[SignedMessage],
) -> Result<()> {
    let mut endorsed: HashSet<PublicKey> =
        [root.public_key].into_iter().collect();

    for message in trail.iter().rev() {
        if !validate_signatures(message)? {
            return Err(Error::ChainReplayFailed(
                root.public_key.to_string(),
            ));
        }
        let signing_keys = message.signing_keys();
        if !signing_keys.iter().any(|key| endorsed.contains(key)) {
            return Err(Error::ChainReplayFailed(
                root.public_key.to_string(),
            ));
        }
        endorsed.extend(signing_keys);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Keyring, Signer, VerifyOptions};
    use anyhow::Result;
    use conclave_protocol::{KeyAdmit, KeyType, Payload};

    /// Sign an admission of `admit` co-signed by `by`.
    async fn admit(
        ring: &Keyring,
        admit_key: PublicKey,
        by: PublicKey,
    ) -> Result<SignedMessage> {
        let payload = Payload::KeyAdmit(KeyAdmit {
            party_key: [1u8; 32].into(),
            admit_key,
            admit_key_type: KeyType::Device,
        });
        let admit_record =
            ring.get(&admit_key).await.expect("admitted key");
        let by_record = ring.get(&by).await.expect("admitting key");
        Ok(ring
            .sign(
                payload,
                &[
                    Signer::Record(admit_record),
                    Signer::Record(by_record),
                ],
                None,
                None,
            )
            .await?)
    }

    /// Admissions I => D1 => D2 => D3 held in one signing ring.
    async fn device_chain() -> Result<(
        Keyring,
        PublicKey,
        PublicKey,
        HashMap<PublicKey, SignedMessage>,
    )> {
        let ring = Keyring::new();
        let identity = ring.generate(KeyType::Identity).await?;
        let d1 = ring.generate(KeyType::Device).await?;
        let d2 = ring.generate(KeyType::Device).await?;
        let d3 = ring.generate(KeyType::Device).await?;

        let mut messages = HashMap::new();
        messages.insert(
            d1.public_key,
            admit(&ring, d1.public_key, identity.public_key)
                .await?,
        );
        messages.insert(
            d2.public_key,
            admit(&ring, d2.public_key, d1.public_key).await?,
        );
        messages.insert(
            d3.public_key,
            admit(&ring, d3.public_key, d2.public_key).await?,
        );

        Ok((ring, identity.public_key, d3.public_key, messages))
    }

    #[tokio::test]
    async fn chain_resolves_across_three_devices() -> Result<()> {
        let (_ring, identity, d3, messages) =
            device_chain().await?;
        let chain = build_key_chain(d3, &messages, &[])?;
        assert_eq!(d3, chain.public_key);

        // Verifier trusts the identity only.
        let verifier = Keyring::new();
        verifier
            .add_public_key(KeyRecord::public_record(
                KeyType::Identity,
                identity,
            ))
            .await?;

        let found = verifier
            .find_trusted(&chain)
            .await?
            .expect("chain should resolve");
        assert_eq!(identity, found.public_key);
        Ok(())
    }

    #[tokio::test]
    async fn chain_fails_without_trusted_root() -> Result<()> {
        let (_ring, _identity, d3, messages) =
            device_chain().await?;
        let chain = build_key_chain(d3, &messages, &[])?;

        let verifier = Keyring::new();
        assert!(verifier.find_trusted(&chain).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn quarantined_key_in_chain_is_fatal() -> Result<()> {
        let (_ring, identity, d3, messages) =
            device_chain().await?;
        let chain = build_key_chain(d3, &messages, &[])?;

        let verifier = Keyring::new();
        let mut record = KeyRecord::public_record(
            KeyType::Identity,
            identity,
        );
        record.trusted = false;
        verifier.add_public_key(record).await?;

        let result = verifier.find_trusted(&chain).await;
        match result {
            Err(error) => assert!(error.is_fatal()),
            _ => panic!("quarantined key must be fatal"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn trusted_tip_returns_without_replay() -> Result<()> {
        let (_ring, _identity, d3, messages) =
            device_chain().await?;
        let chain = build_key_chain(d3, &messages, &[])?;

        let verifier = Keyring::new();
        verifier
            .add_public_key(KeyRecord::public_record(
                KeyType::Device,
                d3,
            ))
            .await?;
        let found = verifier
            .find_trusted(&chain)
            .await?
            .expect("tip is trusted");
        assert_eq!(d3, found.public_key);
        Ok(())
    }

    #[tokio::test]
    async fn chain_signature_verifies_against_root(
    ) -> Result<()> {
        let (ring, identity, d3, messages) =
            device_chain().await?;
        let chain = build_key_chain(d3, &messages, &[])?;

        let message = ring
            .sign(
                Payload::KeyAdmit(KeyAdmit {
                    party_key: [1u8; 32].into(),
                    admit_key: d3,
                    admit_key_type: KeyType::Device,
                }),
                &[Signer::Chain(chain)],
                None,
                None,
            )
            .await?;

        let verifier = Keyring::new();
        verifier
            .add_public_key(KeyRecord::public_record(
                KeyType::Identity,
                identity,
            ))
            .await?;
        let options = VerifyOptions {
            require_all_trusted: true,
            allow_key_chains: true,
        };
        assert!(verifier.verify(&message, options).await?);
        assert!(
            !verifier
                .verify(&message, VerifyOptions::all_trusted())
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn build_requires_admission_message() -> Result<()> {
        let (_ring, _identity, _d3, messages) =
            device_chain().await?;
        let missing: PublicKey = [9u8; 32].into();
        let result = build_key_chain(missing, &messages, &[]);
        assert!(matches!(
            result,
            Err(Error::ChainMessageMissing(_))
        ));
        Ok(())
    }
}
