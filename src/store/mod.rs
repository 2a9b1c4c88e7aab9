//! Durable storage for the token ledger and the daily scan limiter
//!
//! The dispenser core is written against the [`TokenStore`] trait; backends
//! supply the atomicity. Every operation is individually all-or-nothing, and
//! the concurrent-claim discipline (two in-flight claims never receive the
//! same token, and never block each other while distinct rows are free) is
//! part of the trait contract, not the caller's problem.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DispenserResult;
use crate::token::{Outcome, TokenId, TokenRecord};

/// Result of a ledger redemption attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    /// Transitioned UNREDEEMED -> REDEEMED just now
    Redeemed {
        outcome: Outcome,
        redeemed_at: DateTime<Utc>,
    },
    /// Already consumed; carries the original redemption timestamp
    AlreadyRedeemed { redeemed_at: DateTime<Utc> },
    /// No such token in the ledger
    NotFound,
}

/// Result of inserting a daily scan record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanInsert {
    Recorded,
    /// A concurrent insert already recorded a claim for this
    /// (identity, date); first writer wins and no duplicate is created
    AlreadyRecorded,
}

/// Storage operations shared by all backends.
///
/// Ledger rows move UNASSIGNED -> ASSIGNED -> REDEEMED, each transition at
/// most once; `release` and `reset_all` are the two sanctioned reverse
/// paths (compensation and administration respectively).
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Append-only bulk insert. Records with identifiers already present
    /// are skipped; returns the number actually inserted.
    async fn insert_tokens(&self, records: &[TokenRecord]) -> DispenserResult<u64>;

    /// Atomically claim the oldest token that is neither assigned nor
    /// redeemed, stamping it with `now`. Concurrent callers never receive
    /// the same token.
    async fn claim_next_available(&self, now: DateTime<Utc>) -> DispenserResult<Option<TokenId>>;

    /// Compensating action: return an assigned, unredeemed token to the
    /// unassigned pool. No effect on redeemed or unknown tokens.
    async fn release(&self, token: &TokenId) -> DispenserResult<()>;

    /// Read-only lookup
    async fn get(&self, token: &TokenId) -> DispenserResult<Option<TokenRecord>>;

    /// Atomically transition UNREDEEMED -> REDEEMED, only if currently
    /// unredeemed. Never double-redeems; the already-redeemed outcome
    /// carries the first redemption's timestamp.
    async fn redeem(&self, token: &TokenId, now: DateTime<Utc>) -> DispenserResult<RedeemOutcome>;

    /// Token already claimed by this identity on this date, if any
    async fn lookup_scan(&self, identity: &str, date: NaiveDate)
        -> DispenserResult<Option<TokenId>>;

    /// Insert a (identity, date, token) record; idempotent per
    /// (identity, date) key
    async fn record_scan(
        &self,
        identity: &str,
        date: NaiveDate,
        token: &TokenId,
    ) -> DispenserResult<ScanInsert>;

    /// Highest batch prefix present in the ledger, 0 when empty
    async fn max_batch_number(&self) -> DispenserResult<u32>;

    /// Administrative bulk reset: every token back to its initial state,
    /// all daily scan records dropped. Returns how many tokens changed.
    async fn reset_all(&self) -> DispenserResult<u64>;
}
