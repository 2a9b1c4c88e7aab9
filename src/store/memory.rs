//! In-memory backend for tests, demos, and single-process deployments
//!
//! One mutex guards both tables, so every trait operation is atomic exactly
//! as the contract requires. Races between operations (two allocations for
//! the same identity interleaving between lookup and record) are still
//! possible and exercise the protocol's compensation path, the same way the
//! SQL backend's row-level locking does.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::error::{DispenserError, DispenserResult};
use crate::token::{TokenId, TokenRecord};
use super::{RedeemOutcome, ScanInsert, TokenStore};

#[derive(Default)]
struct Tables {
    /// Insertion order defines claim order
    tokens: Vec<TokenRecord>,
    /// Identifier -> position in `tokens`
    index: HashMap<TokenId, usize>,
    /// (identity, date) -> claimed token
    scans: HashMap<(String, NaiveDate), TokenId>,
}

/// Mutex-guarded in-memory store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every token record, in insertion order. Test support.
    pub async fn snapshot(&self) -> Vec<TokenRecord> {
        self.inner.lock().await.tokens.clone()
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_tokens(&self, records: &[TokenRecord]) -> DispenserResult<u64> {
        let mut tables = self.inner.lock().await;
        let mut inserted = 0u64;

        for record in records {
            if tables.index.contains_key(&record.id) {
                continue;
            }
            let pos = tables.tokens.len();
            tables.index.insert(record.id.clone(), pos);
            tables.tokens.push(record.clone());
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn claim_next_available(&self, now: DateTime<Utc>) -> DispenserResult<Option<TokenId>> {
        let mut tables = self.inner.lock().await;

        for record in tables.tokens.iter_mut() {
            if record.is_available() {
                record.mark_assigned(now);
                return Ok(Some(record.id.clone()));
            }
        }

        Ok(None)
    }

    async fn release(&self, token: &TokenId) -> DispenserResult<()> {
        let mut tables = self.inner.lock().await;

        if let Some(&pos) = tables.index.get(token) {
            tables.tokens[pos].clear_assignment();
        }

        Ok(())
    }

    async fn get(&self, token: &TokenId) -> DispenserResult<Option<TokenRecord>> {
        let tables = self.inner.lock().await;
        Ok(tables
            .index
            .get(token)
            .map(|&pos| tables.tokens[pos].clone()))
    }

    async fn redeem(&self, token: &TokenId, now: DateTime<Utc>) -> DispenserResult<RedeemOutcome> {
        let mut tables = self.inner.lock().await;

        let Some(&pos) = tables.index.get(token) else {
            return Ok(RedeemOutcome::NotFound);
        };
        let record = &mut tables.tokens[pos];

        if record.redeemed {
            let redeemed_at = record.redeemed_at.ok_or_else(|| {
                DispenserError::storage("redeem", "redeemed token missing redemption timestamp")
            })?;
            return Ok(RedeemOutcome::AlreadyRedeemed { redeemed_at });
        }

        record.mark_redeemed(now);
        Ok(RedeemOutcome::Redeemed {
            outcome: record.outcome,
            redeemed_at: now,
        })
    }

    async fn lookup_scan(
        &self,
        identity: &str,
        date: NaiveDate,
    ) -> DispenserResult<Option<TokenId>> {
        let tables = self.inner.lock().await;
        Ok(tables.scans.get(&(identity.to_string(), date)).cloned())
    }

    async fn record_scan(
        &self,
        identity: &str,
        date: NaiveDate,
        token: &TokenId,
    ) -> DispenserResult<ScanInsert> {
        let mut tables = self.inner.lock().await;
        let key = (identity.to_string(), date);

        if tables.scans.contains_key(&key) {
            return Ok(ScanInsert::AlreadyRecorded);
        }

        tables.scans.insert(key, token.clone());
        Ok(ScanInsert::Recorded)
    }

    async fn max_batch_number(&self) -> DispenserResult<u32> {
        let tables = self.inner.lock().await;
        Ok(tables
            .tokens
            .iter()
            .map(|record| record.id.batch_number())
            .max()
            .unwrap_or(0))
    }

    async fn reset_all(&self) -> DispenserResult<u64> {
        let mut tables = self.inner.lock().await;
        let mut reset = 0u64;

        for record in tables.tokens.iter_mut() {
            if record.assigned || record.redeemed {
                record.reset();
                reset += 1;
            }
        }
        tables.scans.clear();

        Ok(reset)
    }
}
