//! Complete dispenser flow demonstration
//!
//! This binary walks one promotion day end to end: generate a batch with
//! evenly distributed winners, scan from a few kiosk identities (including a
//! repeat scan), and verify a token at the counter.

use std::sync::Arc;

use perk::{AllocationOutcome, Dispenser, MemoryStore, PerkConfig, RedeemOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PerkConfig::development();
    let store = Arc::new(MemoryStore::new());
    let dispenser = Dispenser::new(store.clone(), &config)?;

    let summary = dispenser.generate_default_batch().await?;
    println!(
        "Generated batch {}: {} tokens, {} winners",
        summary.batch_number, summary.size, summary.winners
    );

    for identity in ["192.168.1.10", "192.168.1.10", "192.168.1.11"] {
        match dispenser.allocate(identity).await? {
            AllocationOutcome::Allocated(token) => {
                println!("Scan from {identity}: handed token {token}");
            }
            AllocationOutcome::Exhausted => {
                println!("Scan from {identity}: sold out");
            }
        }
    }

    // Find an assigned winner to walk to the counter
    let winner = store
        .snapshot()
        .await
        .into_iter()
        .find(|record| record.assigned && record.outcome.is_win());

    let Some(winner) = winner else {
        println!("No assigned winner this round; scan more identities and retry");
        return Ok(());
    };

    match dispenser.redeem_token(&winner.id.to_string()).await? {
        RedeemOutcome::Redeemed { outcome, redeemed_at } => {
            println!("Barista verified {}: {} at {}", winner.id, outcome, redeemed_at);
        }
        other => println!("Unexpected verification result: {other:?}"),
    }

    // A second verification must be refused
    match dispenser.redeem_token(&winner.id.to_string()).await? {
        RedeemOutcome::AlreadyRedeemed { redeemed_at } => {
            println!("Second verification refused: already consumed at {redeemed_at}");
        }
        other => println!("Unexpected verification result: {other:?}"),
    }

    Ok(())
}
