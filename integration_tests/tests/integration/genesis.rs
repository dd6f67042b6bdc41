use anyhow::Result;

use conclave_party::PartyLifecycle;

use crate::test_utils::{wait_for_state, Network};

/// Creating a party seals the start of authority: the creator's
/// identity and the first feed are admitted by the party key and
/// the party secret is destroyed.
#[tokio::test]
async fn integration_create_party() -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let manager = network.manager().await?;
    let identity = manager.identity().await?;

    let party_key = manager.create_party().await?;
    let state = manager
        .party(&party_key)
        .await
        .expect("party should be open");

    wait_for_state(&state, |party| {
        party.member_keys().len() == 1
            && party.member_feeds().len() == 1
    })
    .await?;

    {
        let party = state.read().await;
        assert!(party.is_member(&identity.public_key));
        assert_eq!(
            Some(&party_key),
            party.admitted_by(&identity.public_key)
        );
        assert_eq!(PartyLifecycle::Open, party.lifecycle());
    }

    // The party secret was destroyed after signing genesis.
    assert!(manager
        .keyring()
        .export_secret(&party_key)
        .await
        .is_err());

    Ok(())
}

/// Closing a party drains the in-flight message and transitions
/// to the closed state.
#[tokio::test]
async fn integration_close_party() -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let manager = network.manager().await?;
    let party_key = manager.create_party().await?;
    let state = manager
        .party(&party_key)
        .await
        .expect("party should be open");
    wait_for_state(&state, |party| {
        party.member_keys().len() == 1
    })
    .await?;

    manager.close_party(&party_key).await?;
    wait_for_state(&state, |party| {
        party.lifecycle() == PartyLifecycle::Closed
    })
    .await?;
    assert!(manager.party(&party_key).await.is_none());
    Ok(())
}
