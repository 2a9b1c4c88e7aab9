//! Batch generation with evenly distributed winners
//!
//! A batch of N tokens with W winners is laid out as W contiguous blocks of
//! N/W tokens, one winner at a uniformly random offset inside each block.
//! Spreading winners this way, combined with the ledger claiming in
//! insertion order, keeps prizes flowing at a steady rate instead of
//! clustering.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DispenserError;
use super::record::{Outcome, TokenId, TokenRecord};

/// Summary of one generated-and-inserted batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_number: u32,
    pub size: u32,
    pub winners: u32,
    /// Rows actually inserted; duplicates skipped by the store are not
    /// counted
    pub inserted: u64,
}

/// Generate one batch of token records in claim order.
///
/// `size` must be a positive multiple of a positive `winners`.
pub fn make_batch(
    batch_number: u32,
    size: u32,
    winners: u32,
    created_at: DateTime<Utc>,
) -> Result<Vec<TokenRecord>, DispenserError> {
    if size == 0 || winners == 0 {
        return Err(DispenserError::InvalidBatch {
            message: "Batch size and winner count must be greater than 0".to_string(),
        });
    }

    if size % winners != 0 {
        return Err(DispenserError::InvalidBatch {
            message: format!(
                "For even distribution, size must be divisible by winners ({} / {} leaves a remainder)",
                size, winners
            ),
        });
    }

    let block_size = size / winners;
    let mut rng = rand::thread_rng();
    let mut records = Vec::with_capacity(size as usize);

    for _block in 0..winners {
        let winner_offset = rng.gen_range(0..block_size);
        for slot in 0..block_size {
            let outcome = if slot == winner_offset {
                Outcome::Win
            } else {
                Outcome::Lose
            };
            records.push(TokenRecord::new(
                TokenId::generate(batch_number),
                outcome,
                created_at,
            ));
        }
    }

    Ok(records)
}
