//! Handshake-time authentication of connecting peers.
use chrono::{DateTime, Duration, Utc};

use conclave_protocol::{Payload, SignedMessage};

use crate::{Error, PartyState, Result};

/// Checks that a connecting peer's credentials are signed by a
/// trusted member of the party and are fresh.
///
/// Rejection closes the transport.
pub struct Authenticator {
    max_age: Duration,
    max_skew: Duration,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self {
            max_age: Duration::hours(24),
            max_skew: Duration::hours(1),
        }
    }
}

impl Authenticator {
    /// Create an authenticator with explicit freshness bounds.
    pub fn new(max_age: Duration, max_skew: Duration) -> Self {
        Self { max_age, max_skew }
    }

    /// Authenticate a peer's signed auth credential against a
    /// party.
    pub async fn authenticate(
        &self,
        party: &PartyState,
        message: &SignedMessage,
    ) -> Result<()> {
        let Payload::Auth(auth) = message.payload() else {
            return Err(Error::AuthGeneral(format!(
                "expected auth payload, got {}",
                message.payload().type_url()
            )));
        };

        if &auth.party_key != party.public_key() {
            return Err(Error::AuthRejected(format!(
                "auth names party {}",
                auth.party_key
            )));
        }

        if !conclave_keyring::validate_signatures(message)? {
            return Err(Error::AuthRejected(
                "signature verification failed".to_owned(),
            ));
        }

        let device_signature = message
            .signatures
            .iter()
            .find(|signature| signature.key == auth.device_key)
            .ok_or_else(|| {
                Error::AuthRejected(
                    "auth is not signed by the device key"
                        .to_owned(),
                )
            })?;

        if let Some(feed_key) = &auth.feed_key {
            if !message.was_signed_by(feed_key) {
                return Err(Error::AuthRejected(
                    "auth is not signed by the announced feed"
                        .to_owned(),
                ));
            }
        }

        // Resolve the key that must hold membership: the root of
        // the device's chain, or the device itself when it was
        // admitted directly.
        let resolved = match &device_signature.key_chain {
            Some(chain) => {
                let root = party
                    .keyring()
                    .find_trusted(chain)
                    .await?
                    .ok_or_else(|| {
                        Error::AuthRejected(
                            "device chain has no trusted root"
                                .to_owned(),
                        )
                    })?;
                if root.public_key != auth.identity_key {
                    return Err(Error::AuthRejected(
                        "device chain does not root at the \
                         claimed identity"
                            .to_owned(),
                    ));
                }
                root.public_key
            }
            None => auth.device_key,
        };

        if !party.is_member(&resolved) {
            return Err(Error::AuthRejected(format!(
                "{} is not a member of the party",
                resolved
            )));
        }

        self.check_freshness(&message.signed.created)?;
        Ok(())
    }

    /// The credential timestamp must fall inside
    /// `[now - max_age, now + max_skew]`.
    fn check_freshness(&self, created: &str) -> Result<()> {
        let created = DateTime::parse_from_rfc3339(created)
            .map_err(|error| {
                Error::AuthGeneral(format!(
                    "bad created timestamp: {}",
                    error
                ))
            })?
            .with_timezone(&Utc);
        let now = Utc::now();
        if created < now - self.max_age
            || created > now + self.max_skew
        {
            return Err(Error::AuthRejected(
                "credential timestamp out of range".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashMap;

    use conclave_keyring::{
        build_key_chain, Keyring, Signer,
    };
    use conclave_protocol::{
        Auth, KeyAdmit, KeyType, PartyGenesis, PublicKey,
    };

    struct Fixture {
        party: PartyState,
        ring: Keyring,
        party_key: PublicKey,
        identity: PublicKey,
    }

    async fn signer(
        ring: &Keyring,
        key: &PublicKey,
    ) -> Signer {
        Signer::Record(
            ring.get(key).await.expect("signing key"),
        )
    }

    async fn member_party() -> Result<Fixture> {
        let ring = Keyring::new();
        let party_key =
            ring.generate(KeyType::Party).await?.public_key;
        let feed =
            ring.generate(KeyType::Feed).await?.public_key;
        let identity =
            ring.generate(KeyType::Identity).await?.public_key;

        let genesis = ring
            .sign(
                Payload::PartyGenesis(PartyGenesis {
                    party_key,
                    feed_key: feed,
                    admit_key: identity,
                    admit_key_type: KeyType::Identity,
                }),
                &[
                    signer(&ring, &party_key).await,
                    signer(&ring, &feed).await,
                    signer(&ring, &identity).await,
                ],
                None,
                None,
            )
            .await?;

        let mut party = PartyState::new(party_key).await?;
        party.process_message(genesis).await?;

        Ok(Fixture {
            party,
            ring,
            party_key,
            identity,
        })
    }

    fn auth_payload(
        fixture: &Fixture,
        device_key: PublicKey,
    ) -> Payload {
        Payload::Auth(Auth {
            party_key: fixture.party_key,
            identity_key: fixture.identity,
            device_key,
            feed_key: None,
        })
    }

    #[tokio::test]
    async fn accepts_member_device() -> Result<()> {
        let fixture = member_party().await?;
        let auth = fixture
            .ring
            .sign(
                auth_payload(&fixture, fixture.identity),
                &[signer(&fixture.ring, &fixture.identity)
                    .await],
                None,
                None,
            )
            .await?;

        Authenticator::default()
            .authenticate(&fixture.party, &auth)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn accepts_chained_device() -> Result<()> {
        let fixture = member_party().await?;

        // The device is admitted to the identity, not to the
        // party; the chain proves the derivation.
        let device = fixture
            .ring
            .generate(KeyType::Device)
            .await?
            .public_key;
        let admission = fixture
            .ring
            .sign(
                Payload::KeyAdmit(KeyAdmit {
                    party_key: fixture.party_key,
                    admit_key: device,
                    admit_key_type: KeyType::Device,
                }),
                &[
                    signer(&fixture.ring, &device).await,
                    signer(&fixture.ring, &fixture.identity)
                        .await,
                ],
                None,
                None,
            )
            .await?;
        let mut messages = HashMap::new();
        messages.insert(device, admission);
        let chain = build_key_chain(device, &messages, &[])?;

        let auth = fixture
            .ring
            .sign(
                auth_payload(&fixture, device),
                &[Signer::Chain(chain)],
                None,
                None,
            )
            .await?;

        Authenticator::default()
            .authenticate(&fixture.party, &auth)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn rejects_unknown_device() -> Result<()> {
        let fixture = member_party().await?;
        let stranger = fixture
            .ring
            .generate(KeyType::Device)
            .await?
            .public_key;
        let auth = fixture
            .ring
            .sign(
                auth_payload(&fixture, stranger),
                &[signer(&fixture.ring, &stranger).await],
                None,
                None,
            )
            .await?;

        let result = Authenticator::default()
            .authenticate(&fixture.party, &auth)
            .await;
        assert!(matches!(result, Err(Error::AuthRejected(_))));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_wrong_party() -> Result<()> {
        let fixture = member_party().await?;
        let auth = fixture
            .ring
            .sign(
                Payload::Auth(Auth {
                    party_key: [9u8; 32].into(),
                    identity_key: fixture.identity,
                    device_key: fixture.identity,
                    feed_key: None,
                }),
                &[signer(&fixture.ring, &fixture.identity)
                    .await],
                None,
                None,
            )
            .await?;

        let result = Authenticator::default()
            .authenticate(&fixture.party, &auth)
            .await;
        assert!(matches!(result, Err(Error::AuthRejected(_))));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_stale_credential() -> Result<()> {
        let fixture = member_party().await?;
        let stale =
            (Utc::now() - Duration::hours(25)).to_rfc3339();
        let auth = fixture
            .ring
            .sign(
                auth_payload(&fixture, fixture.identity),
                &[signer(&fixture.ring, &fixture.identity)
                    .await],
                None,
                Some(stale),
            )
            .await?;

        let result = Authenticator::default()
            .authenticate(&fixture.party, &auth)
            .await;
        assert!(matches!(result, Err(Error::AuthRejected(_))));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_tampered_auth() -> Result<()> {
        let fixture = member_party().await?;
        let mut auth = fixture
            .ring
            .sign(
                auth_payload(&fixture, fixture.identity),
                &[signer(&fixture.ring, &fixture.identity)
                    .await],
                None,
                None,
            )
            .await?;
        auth.signed.nonce = vec![0u8; 32];

        let result = Authenticator::default()
            .authenticate(&fixture.party, &auth)
            .await;
        assert!(matches!(result, Err(Error::AuthRejected(_))));
        Ok(())
    }
}
