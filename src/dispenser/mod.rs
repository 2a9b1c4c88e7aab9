//! Allocation and redemption protocols
//!
//! [`Dispenser`] is the externally-invoked surface behind a kiosk scan and a
//! barista verification. It owns no state of its own; every mutation is one
//! of the store's atomic operations, and the one cross-operation window (the
//! same identity racing itself between daily-scan lookup and insert) is
//! closed by a compensating release.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::config::{BatchConfig, PerkConfig};
use crate::error::{DispenserError, DispenserResult};
use crate::store::{RedeemOutcome, ScanInsert, TokenStore};
use crate::token::{make_batch, BatchSummary, TokenId, TokenStatus};

/// Result of one kiosk scan
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationOutcome {
    /// The token this identity holds for today, freshly claimed or the
    /// same one from an earlier scan
    Allocated(TokenId),
    /// No unclaimed tokens remain; retryable steady-state condition
    Exhausted,
}

/// Protocol front-end over a shared token store
pub struct Dispenser {
    store: Arc<dyn TokenStore>,
    reference_offset: FixedOffset,
    batch_defaults: BatchConfig,
}

impl Dispenser {
    /// Build a dispenser from configuration
    pub fn new(store: Arc<dyn TokenStore>, config: &PerkConfig) -> DispenserResult<Self> {
        let reference_offset = FixedOffset::east_opt(config.time.utc_offset_minutes.saturating_mul(60))
            .ok_or_else(|| DispenserError::Configuration {
                message: "UTC offset out of range".to_string(),
                field: "time.utc_offset_minutes".to_string(),
            })?;

        Ok(Self {
            store,
            reference_offset,
            batch_defaults: config.batch.clone(),
        })
    }

    /// Calendar date in the fixed reference offset, never per-request
    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.reference_offset).date_naive()
    }

    /// Allocate a token for `identity`: the kiosk scan entry point
    #[instrument(skip(self))]
    pub async fn allocate(&self, identity: &str) -> DispenserResult<AllocationOutcome> {
        self.allocate_at(identity, Utc::now()).await
    }

    /// Clock-injected variant of [`allocate`](Self::allocate)
    pub async fn allocate_at(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> DispenserResult<AllocationOutcome> {
        let today = self.local_date(now);

        // Idempotent re-scan: same visitor, same day, same token
        if let Some(existing) = self.store.lookup_scan(identity, today).await? {
            info!(identity, token = %existing, "repeat scan, returning today's token");
            return Ok(AllocationOutcome::Allocated(existing));
        }

        let Some(claimed) = self.store.claim_next_available(now).await? else {
            // A concurrent request from this same identity may have claimed
            // the last token and recorded it between our lookup and now;
            // re-read before telling the visitor to come back later.
            if let Some(existing) = self.store.lookup_scan(identity, today).await? {
                info!(identity, token = %existing, "pool dry but identity already holds a token");
                return Ok(AllocationOutcome::Allocated(existing));
            }
            warn!(identity, "token pool exhausted");
            return Ok(AllocationOutcome::Exhausted);
        };

        let recorded = match self.store.record_scan(identity, today, &claimed).await {
            Ok(recorded) => recorded,
            Err(err) => {
                // Do not strand the claimed token; compensate, then surface
                // the original failure.
                if let Err(release_err) = self.store.release(&claimed).await {
                    warn!(
                        token = %claimed,
                        error = %release_err,
                        "release after scan-record failure also failed"
                    );
                }
                return Err(err);
            }
        };

        match recorded {
            ScanInsert::Recorded => {
                info!(identity, token = %claimed, "token allocated");
                Ok(AllocationOutcome::Allocated(claimed))
            }
            ScanInsert::AlreadyRecorded => {
                // A concurrent request for this identity won the daily slot.
                // Return the claimed token to the pool and converge on the
                // winner's, so both callers observe one consistent token.
                self.store.release(&claimed).await?;

                let winner = self
                    .store
                    .lookup_scan(identity, today)
                    .await?
                    .ok_or_else(|| {
                        DispenserError::storage(
                            "record_scan",
                            "daily scan record vanished after conflicting insert",
                        )
                    })?;

                info!(
                    identity,
                    token = %winner,
                    released = %claimed,
                    "lost same-identity race, converged on recorded token"
                );
                Ok(AllocationOutcome::Allocated(winner))
            }
        }
    }

    /// Status view for the barista-facing query endpoint. Unknown and
    /// malformed identifiers both report `valid: false`.
    pub async fn token_status(&self, raw: &str) -> DispenserResult<TokenStatus> {
        let Ok(token) = TokenId::parse(raw) else {
            return Ok(TokenStatus::invalid());
        };

        match self.store.get(&token).await? {
            Some(record) => Ok(TokenStatus::from_record(&record)),
            None => Ok(TokenStatus::invalid()),
        }
    }

    /// Consume a token: the barista verification entry point. Delegates to
    /// the ledger and adds no state; losing tokens are consumable too,
    /// whether to offer that is the UI's policy.
    #[instrument(skip(self))]
    pub async fn redeem_token(&self, raw: &str) -> DispenserResult<RedeemOutcome> {
        let Ok(token) = TokenId::parse(raw) else {
            return Ok(RedeemOutcome::NotFound);
        };

        let outcome = self.store.redeem(&token, Utc::now()).await?;
        match &outcome {
            RedeemOutcome::Redeemed { outcome, .. } => {
                info!(token = %token, result = %outcome, "token redeemed");
            }
            RedeemOutcome::AlreadyRedeemed { redeemed_at } => {
                info!(token = %token, %redeemed_at, "redemption refused, already consumed");
            }
            RedeemOutcome::NotFound => {
                info!(token = %token, "redemption refused, unknown token");
            }
        }

        Ok(outcome)
    }

    /// Generate and insert the next batch of tokens
    #[instrument(skip(self))]
    pub async fn generate_batch(&self, size: u32, winners: u32) -> DispenserResult<BatchSummary> {
        let batch_number = self.store.max_batch_number().await? + 1;
        let records = make_batch(batch_number, size, winners, Utc::now())?;
        let inserted = self.store.insert_tokens(&records).await?;

        info!(batch_number, size, winners, inserted, "batch generated");
        Ok(BatchSummary {
            batch_number,
            size,
            winners,
            inserted,
        })
    }

    /// Generate a batch using the configured defaults
    pub async fn generate_default_batch(&self) -> DispenserResult<BatchSummary> {
        self.generate_batch(self.batch_defaults.default_size, self.batch_defaults.default_winners)
            .await
    }

    /// Administrative bulk reset of the whole ledger
    #[instrument(skip(self))]
    pub async fn reset_all(&self) -> DispenserResult<u64> {
        let reset = self.store.reset_all().await?;
        warn!(reset, "administrative reset: all tokens returned to initial state");
        Ok(reset)
    }
}
