//! Properties that must hold after any sequence of protocol operations

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use perk::config::PerkConfig;
use perk::dispenser::{AllocationOutcome, Dispenser};
use perk::store::{MemoryStore, TokenStore};
use perk::token::{make_batch, TokenId};

/// One step of dispenser/store activity
#[derive(Debug, Clone)]
enum Op {
    /// Kiosk scan from one of a small pool of identities
    Allocate(usize),
    /// Barista verification of some ledger position
    Redeem(usize),
    /// Verification attempt against an identifier that was never generated
    RedeemUnknown,
    /// An in-flight claim that never reached a visitor
    Claim,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..5usize).prop_map(Op::Allocate),
        (0..20usize).prop_map(Op::Redeem),
        Just(Op::RedeemUnknown),
        Just(Op::Claim),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_invariants_hold_after_any_operation_sequence(
        ops in prop::collection::vec(arb_op(), 1..60)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let store = Arc::new(MemoryStore::new());
            let records = make_batch(1, 20, 4, Utc::now()).unwrap();
            let ids: Vec<TokenId> = records.iter().map(|r| r.id.clone()).collect();
            store.insert_tokens(&records).await.unwrap();

            let dispenser = Dispenser::new(store.clone(), &PerkConfig::default()).unwrap();
            let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

            let mut handed: HashMap<String, TokenId> = HashMap::new();

            for op in ops {
                match op {
                    Op::Allocate(i) => {
                        let identity = format!("10.0.0.{}", i);
                        match dispenser.allocate_at(&identity, now).await.unwrap() {
                            AllocationOutcome::Allocated(token) => {
                                // Same identity, same day, same token: always
                                if let Some(previous) = handed.insert(identity, token.clone()) {
                                    assert_eq!(previous, token);
                                }
                            }
                            AllocationOutcome::Exhausted => {
                                // Only legitimate when the pool is truly dry
                                let available = store
                                    .snapshot()
                                    .await
                                    .into_iter()
                                    .filter(|r| r.is_available())
                                    .count();
                                assert_eq!(available, 0);
                            }
                        }
                    }
                    Op::Redeem(pos) => {
                        let id = &ids[pos % ids.len()];
                        dispenser.redeem_token(&id.to_string()).await.unwrap();
                    }
                    Op::RedeemUnknown => {
                        let outcome = dispenser.redeem_token("999_0BADF00D").await.unwrap();
                        assert_eq!(outcome, perk::store::RedeemOutcome::NotFound);
                    }
                    Op::Claim => {
                        store.claim_next_available(now).await.unwrap();
                    }
                }
            }

            // REDEEMED implies ASSIGNED, and timestamps track state exactly
            for record in store.snapshot().await {
                if record.redeemed {
                    assert!(record.assigned, "redeemed but unassigned: {}", record.id);
                }
                assert_eq!(record.assigned, record.assigned_at.is_some());
                assert_eq!(record.redeemed, record.redeemed_at.is_some());
            }

            // No two identities ever hold the same token
            let unique: HashSet<_> = handed.values().collect();
            assert_eq!(unique.len(), handed.len());

            // And each handed-out token really is assigned in the ledger
            for token in handed.values() {
                let record = store.get(token).await.unwrap().unwrap();
                assert!(record.assigned);
            }
        });
    }

    #[test]
    fn prop_sequential_scans_dispense_in_insertion_order(
        visitors in 1..15usize
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let store = Arc::new(MemoryStore::new());
            let records = make_batch(1, 15, 3, Utc::now()).unwrap();
            let ids: Vec<TokenId> = records.iter().map(|r| r.id.clone()).collect();
            store.insert_tokens(&records).await.unwrap();

            let dispenser = Dispenser::new(store.clone(), &PerkConfig::default()).unwrap();

            for (i, expected) in ids.iter().take(visitors).enumerate() {
                let outcome = dispenser.allocate(&format!("10.2.0.{}", i)).await.unwrap();
                assert_eq!(outcome, AllocationOutcome::Allocated(expected.clone()));
            }
        });
    }

    #[test]
    fn prop_batches_place_one_winner_per_block(
        winners in 1..12u32,
        block_size in 1..8u32,
    ) {
        let size = winners * block_size;
        let records = make_batch(3, size, winners, Utc::now()).unwrap();

        assert_eq!(records.len(), size as usize);

        let total_wins = records.iter().filter(|r| r.outcome.is_win()).count();
        assert_eq!(total_wins, winners as usize);

        for block in records.chunks(block_size as usize) {
            let wins = block.iter().filter(|r| r.outcome.is_win()).count();
            assert_eq!(wins, 1);
        }

        let unique: HashSet<_> = records.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(unique.len(), records.len());
    }
}
