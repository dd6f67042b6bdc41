//! Signed message container and key chains.
use serde::{Deserialize, Serialize};

use crate::{canonical_bytes, Payload, PublicKey, Result};

/// Body of a signed message.
///
/// The canonical image of this struct alone is what signatures
/// cover; the signature list itself is never signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    /// RFC-3339 timestamp recording when the message was signed.
    pub created: String,
    /// Random value binding the message to a signing session.
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    /// Payload carried by the message.
    pub payload: Payload,
}

/// Detached signature over the canonical image of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSignature {
    /// Public key the signature was created with.
    pub key: PublicKey,
    /// Detached ed25519 signature bytes.
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    /// Chain of admission messages proving that the signing key
    /// derives from a key the recipient trusts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_chain: Option<KeyChain>,
}

/// A message body together with one or more signatures over its
/// canonical image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedMessage {
    /// Signed body.
    pub signed: MessageData,
    /// Signatures over the body.
    pub signatures: Vec<MessageSignature>,
}

impl SignedMessage {
    /// Canonical byte image covered by the signatures.
    pub fn data_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(&self.signed)
    }

    /// Payload carried by this message.
    pub fn payload(&self) -> &Payload {
        &self.signed.payload
    }

    /// Public keys of all signatures on this message.
    pub fn signing_keys(&self) -> Vec<PublicKey> {
        self.signatures.iter().map(|s| s.key).collect()
    }

    /// Whether this message carries a signature attributed to
    /// the given key.
    ///
    /// Attribution only; the signature still has to be verified.
    pub fn was_signed_by(&self, key: &PublicKey) -> bool {
        self.signatures.iter().any(|s| &s.key == key)
    }

    /// Walk nested envelope layers from this message to the
    /// innermost payload.
    ///
    /// The first element is this message and the last element is
    /// the innermost message whose payload is not an envelope.
    pub fn envelope_chain(&self) -> Vec<&SignedMessage> {
        let mut chain = vec![self];
        let mut current = self;
        while let Payload::Envelope(envelope) =
            &current.signed.payload
        {
            current = &envelope.message;
            chain.push(current);
        }
        chain
    }

    /// Innermost message after unwrapping any envelope layers.
    pub fn innermost(&self) -> &SignedMessage {
        let chain = self.envelope_chain();
        chain[chain.len() - 1]
    }
}

/// Tree of admission messages proving that a public key has been
/// transitively endorsed by another key.
///
/// Every node's message must be signed by the node's own key and
/// by each parent's key; cycles are forbidden by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyChain {
    /// Key endorsed at this node.
    pub public_key: PublicKey,
    /// Admission message for the key.
    pub message: Box<SignedMessage>,
    /// Chains for the other keys that signed the admission.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<KeyChain>,
}

impl KeyChain {
    /// Keys of every node in this chain, tip first.
    pub fn keys(&self) -> Vec<PublicKey> {
        let mut keys = vec![self.public_key];
        for parent in &self.parents {
            keys.extend(parent.keys());
        }
        keys
    }

    /// Number of nodes in this chain.
    pub fn node_count(&self) -> usize {
        1 + self
            .parents
            .iter()
            .map(KeyChain::node_count)
            .sum::<usize>()
    }
}
