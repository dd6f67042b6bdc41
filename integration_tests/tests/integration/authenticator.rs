use anyhow::Result;
use std::sync::Arc;

use conclave_greeting::{EqualityValidator, StaticSecret};
use conclave_keyring::Signer;
use conclave_protocol::{Auth, Payload};

use crate::test_utils::{wait_for_state, Network};

/// After a greeting, the new member's auth credential passes
/// the handshake check on the greeter's side, and a stranger's
/// credential is rejected.
#[tokio::test]
async fn integration_authenticate_joined_member() -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let greeter = network.manager().await?;
    let invitee = network.manager().await?;
    let stranger = network.manager().await?;

    let invitee_identity = invitee.identity().await?;

    let party_key = greeter.create_party().await?;
    let greeter_state = greeter
        .party(&party_key)
        .await
        .expect("party should be open");
    wait_for_state(&greeter_state, |party| {
        party.member_keys().len() == 1
    })
    .await?;

    let (invitation_id, rendezvous_key) = greeter
        .host_invitation(
            &party_key,
            Arc::new(StaticSecret::new(b"0452".to_vec())),
            Arc::new(EqualityValidator),
            None,
        )
        .await?;
    invitee
        .join_party(
            &rendezvous_key,
            invitation_id,
            Arc::new(StaticSecret::new(b"0452".to_vec())),
        )
        .await?;
    wait_for_state(&greeter_state, |party| {
        party.is_member(&invitee_identity.public_key)
    })
    .await?;

    let auth = invitee
        .keyring()
        .sign(
            Payload::Auth(Auth {
                party_key,
                identity_key: invitee_identity.public_key,
                device_key: invitee_identity.public_key,
                feed_key: None,
            }),
            &[Signer::Record(invitee_identity.clone())],
            None,
            None,
        )
        .await?;
    greeter.authenticate_peer(&party_key, &auth).await?;

    // A stranger's credential does not bind to a member.
    let stranger_identity = stranger.identity().await?;
    let forged = stranger
        .keyring()
        .sign(
            Payload::Auth(Auth {
                party_key,
                identity_key: stranger_identity.public_key,
                device_key: stranger_identity.public_key,
                feed_key: None,
            }),
            &[Signer::Record(stranger_identity)],
            None,
            None,
        )
        .await?;
    assert!(greeter
        .authenticate_peer(&party_key, &forged)
        .await
        .is_err());

    Ok(())
}
