use anyhow::Result;

use crate::test_utils::{wait_for_state, Network};

/// Offline invitation flow: a member writes a key-bound
/// invitation into the party log; the invitee claims it by
/// proving control of the invitee key and joins through the
/// interactive invitation spawned by the claim.
#[tokio::test]
async fn integration_claim_written_invitation() -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let issuer = network.manager().await?;
    let claimant = network.manager().await?;

    let claimant_identity = claimant.identity().await?;

    let party_key = issuer.create_party().await?;
    let issuer_state = issuer
        .party(&party_key)
        .await
        .expect("party should be open");
    wait_for_state(&issuer_state, |party| {
        party.member_keys().len() == 1
    })
    .await?;

    let invitation_id = issuer
        .write_invitation(
            &party_key,
            claimant_identity.public_key,
        )
        .await?;

    // The invitation must be ingested before it can be claimed.
    wait_for_state(&issuer_state, |party| {
        party
            .invitations()
            .invitation(&invitation_id)
            .is_some()
    })
    .await?;

    let joined = claimant
        .claim_invitation(&party_key, invitation_id)
        .await?;
    assert_eq!(party_key, joined);

    wait_for_state(&issuer_state, |party| {
        party.is_member(&claimant_identity.public_key)
    })
    .await?;
    Ok(())
}

/// A claim signed by a key other than the written invitee key
/// is rejected.
#[tokio::test]
async fn integration_claim_requires_bound_key() -> Result<()> {
    crate::test_utils::init_tracing();

    let network = Network::new();
    let issuer = network.manager().await?;
    let claimant = network.manager().await?;
    let stranger = network.manager().await?;

    let claimant_identity = claimant.identity().await?;

    let party_key = issuer.create_party().await?;
    let issuer_state = issuer
        .party(&party_key)
        .await
        .expect("party should be open");
    wait_for_state(&issuer_state, |party| {
        party.member_keys().len() == 1
    })
    .await?;

    let invitation_id = issuer
        .write_invitation(
            &party_key,
            claimant_identity.public_key,
        )
        .await?;
    wait_for_state(&issuer_state, |party| {
        party
            .invitations()
            .invitation(&invitation_id)
            .is_some()
    })
    .await?;

    // The stranger holds a different identity key, so its claim
    // cannot bind to the written invitee key.
    let result = stranger
        .claim_invitation(&party_key, invitation_id)
        .await;
    assert!(result.is_err());

    let party = issuer_state.read().await;
    assert_eq!(1, party.member_keys().len());
    Ok(())
}
