use anyhow::Result;
use std::sync::Arc;

use conclave_greeting::{EqualityValidator, StaticSecret};

use crate::test_utils::{wait_for_state, Network};

/// Full interactive greeting: a greeter hosts an invitation, an
/// invitee joins with the out-of-band secret, and both sides
/// converge on the same membership.
#[tokio::test]
async fn integration_greeting_admits_member() -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let greeter = network.manager().await?;
    let invitee = network.manager().await?;

    let greeter_identity = greeter.identity().await?;
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

    let joined = invitee
        .join_party(
            &rendezvous_key,
            invitation_id,
            Arc::new(StaticSecret::new(b"0452".to_vec())),
        )
        .await?;
    assert_eq!(party_key, joined);

    // The greeter ingests the notarized envelopes it wrote.
    wait_for_state(&greeter_state, |party| {
        party.is_member(&invitee_identity.public_key)
    })
    .await?;
    {
        let party = greeter_state.read().await;
        assert_eq!(
            Some(&greeter_identity.public_key),
            party.admitted_by(&invitee_identity.public_key)
        );
        assert_eq!(2, party.member_feeds().len());
    }

    // The invitee replicates the full log and converges on the
    // same membership.
    let invitee_state = invitee
        .party(&party_key)
        .await
        .expect("joined party should be open");
    wait_for_state(&invitee_state, |party| {
        party.is_member(&greeter_identity.public_key)
            && party.is_member(&invitee_identity.public_key)
    })
    .await?;
    {
        let greeter_party = greeter_state.read().await;
        let invitee_party = invitee_state.read().await;
        assert_eq!(
            greeter_party.member_keys(),
            invitee_party.member_keys()
        );
        assert_eq!(
            greeter_party.member_feeds(),
            invitee_party.member_feeds()
        );
    }

    Ok(())
}

/// A wrong out-of-band secret is rejected and admits nothing.
#[tokio::test]
async fn integration_greeting_rejects_wrong_secret(
) -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let greeter = network.manager().await?;
    let invitee = network.manager().await?;

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

    let result = invitee
        .join_party(
            &rendezvous_key,
            invitation_id,
            Arc::new(StaticSecret::new(b"9999".to_vec())),
        )
        .await;
    assert!(result.is_err());

    let party = greeter_state.read().await;
    assert_eq!(1, party.member_keys().len());
    Ok(())
}
