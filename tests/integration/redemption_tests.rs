//! Integration tests for the redemption protocol and the status view

use std::sync::Arc;

use chrono::Utc;
use perk::config::PerkConfig;
use perk::dispenser::Dispenser;
use perk::store::{MemoryStore, RedeemOutcome, TokenStore};
use perk::token::{Outcome, TokenId, TokenRecord};

async fn dispenser_with(records: Vec<TokenRecord>) -> (Dispenser, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.insert_tokens(&records).await.unwrap();
    let dispenser = Dispenser::new(store.clone(), &PerkConfig::default()).unwrap();
    (dispenser, store)
}

fn assigned_winner(id: &TokenId) -> TokenRecord {
    let mut record = TokenRecord::new(id.clone(), Outcome::Win, Utc::now());
    record.mark_assigned(Utc::now());
    record
}

#[tokio::test]
async fn test_winning_token_redeems_exactly_once() {
    let id = TokenId::generate(1);
    let (dispenser, _) = dispenser_with(vec![assigned_winner(&id)]).await;

    let first = dispenser.redeem_token(&id.to_string()).await.unwrap();
    let RedeemOutcome::Redeemed { outcome, redeemed_at: t1 } = first else {
        panic!("expected successful redemption, got {:?}", first);
    };
    assert_eq!(outcome, Outcome::Win);

    // Second verification is refused and reports the first timestamp
    let second = dispenser.redeem_token(&id.to_string()).await.unwrap();
    assert_eq!(second, RedeemOutcome::AlreadyRedeemed { redeemed_at: t1 });
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let (dispenser, _) = dispenser_with(vec![]).await;

    let outcome = dispenser.redeem_token("9_DEADBEEF").await.unwrap();
    assert_eq!(outcome, RedeemOutcome::NotFound);
}

#[tokio::test]
async fn test_malformed_identifier_is_not_found() {
    let (dispenser, _) = dispenser_with(vec![]).await;

    for raw in ["", "scribble", "1_abcdef12", "1_TOOSHORT!!"] {
        let outcome = dispenser.redeem_token(raw).await.unwrap();
        assert_eq!(outcome, RedeemOutcome::NotFound, "raw: {:?}", raw);
    }
}

#[tokio::test]
async fn test_losing_token_is_consumable() {
    // The ledger does not police outcome; whether to offer redemption for
    // losers is the UI's call.
    let id = TokenId::generate(1);
    let mut record = TokenRecord::new(id.clone(), Outcome::Lose, Utc::now());
    record.mark_assigned(Utc::now());
    let (dispenser, _) = dispenser_with(vec![record]).await;

    let outcome = dispenser.redeem_token(&id.to_string()).await.unwrap();
    assert!(matches!(
        outcome,
        RedeemOutcome::Redeemed { outcome: Outcome::Lose, .. }
    ));
}

#[tokio::test]
async fn test_redeeming_unassigned_token_keeps_invariant() {
    let id = TokenId::generate(1);
    let record = TokenRecord::new(id.clone(), Outcome::Win, Utc::now());
    let (dispenser, store) = dispenser_with(vec![record]).await;

    dispenser.redeem_token(&id.to_string()).await.unwrap();

    let stored = store.get(&id).await.unwrap().unwrap();
    assert!(stored.redeemed);
    assert!(stored.assigned);
    assert_eq!(stored.assigned_at, stored.redeemed_at);
}

#[tokio::test]
async fn test_status_reflects_lifecycle() {
    let id = TokenId::generate(1);
    let (dispenser, _) = dispenser_with(vec![assigned_winner(&id)]).await;

    let status = dispenser.token_status(&id.to_string()).await.unwrap();
    assert!(status.valid);
    assert_eq!(status.token, Some(id.clone()));
    assert_eq!(status.outcome, Some(Outcome::Win));
    assert_eq!(status.assigned, Some(true));
    assert_eq!(status.redeemed, Some(false));
    assert_eq!(status.redeemed_at, None);

    dispenser.redeem_token(&id.to_string()).await.unwrap();

    let status = dispenser.token_status(&id.to_string()).await.unwrap();
    assert_eq!(status.redeemed, Some(true));
    assert!(status.redeemed_at.is_some());
}

#[tokio::test]
async fn test_status_for_unknown_and_malformed_identifiers() {
    let (dispenser, _) = dispenser_with(vec![]).await;

    let unknown = dispenser.token_status("9_DEADBEEF").await.unwrap();
    assert!(!unknown.valid);
    assert_eq!(unknown.token, None);

    let malformed = dispenser.token_status("???").await.unwrap();
    assert!(!malformed.valid);
}

#[tokio::test]
async fn test_reset_makes_redeemed_token_playable_again() {
    let id = TokenId::generate(1);
    let (dispenser, store) = dispenser_with(vec![assigned_winner(&id)]).await;

    dispenser.redeem_token(&id.to_string()).await.unwrap();
    let reset = dispenser.reset_all().await.unwrap();
    assert_eq!(reset, 1);

    let stored = store.get(&id).await.unwrap().unwrap();
    assert!(stored.is_available());

    // Redeemable again after the administrative reset
    let outcome = dispenser.redeem_token(&id.to_string()).await.unwrap();
    assert!(matches!(outcome, RedeemOutcome::Redeemed { .. }));
}
