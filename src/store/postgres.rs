//! PostgreSQL backend
//!
//! Claim selection is a single statement using `FOR UPDATE SKIP LOCKED`, so
//! concurrent claimants take distinct rows without queueing on each other,
//! and the daily-scan insert is `ON CONFLICT DO NOTHING`, so the first
//! writer for an (identity, date) key wins and later writers learn they
//! lost. Both disciplines coordinate across server processes, which no
//! process-local lock can.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::StoreConfig;
use crate::error::{DispenserError, DispenserResult};
use crate::token::{Outcome, TokenId, TokenRecord};
use super::{RedeemOutcome, ScanInsert, TokenStore};

/// Pooled PostgreSQL store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect using the configured URL and pool limits
    pub async fn connect(config: &StoreConfig) -> DispenserResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| DispenserError::Configuration {
                message: "PostgreSQL backend selected but no database URL configured".to_string(),
                field: "store.database_url".to_string(),
            })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(url)
            .await
            .map_err(|e| DispenserError::storage("connect", e))?;

        Ok(Self { pool })
    }

    /// Create the tokens and daily_scans tables if they do not exist
    pub async fn ensure_schema(&self) -> DispenserResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id BIGSERIAL PRIMARY KEY,
                token VARCHAR(50) UNIQUE NOT NULL,
                result VARCHAR(10) NOT NULL CHECK (result IN ('win', 'lose')),
                assigned BOOLEAN NOT NULL DEFAULT FALSE,
                redeemed BOOLEAN NOT NULL DEFAULT FALSE,
                assigned_at TIMESTAMPTZ NULL,
                redeemed_at TIMESTAMPTZ NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("ensure_schema", e))?;

        // Partial index keeps claim selection cheap as the ledger grows
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_tokens_available
            ON tokens (id)
            WHERE NOT assigned AND NOT redeemed
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("ensure_schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_scans (
                id BIGSERIAL PRIMARY KEY,
                identity TEXT NOT NULL,
                scan_date DATE NOT NULL,
                token VARCHAR(50) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (identity, scan_date)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("ensure_schema", e))?;

        Ok(())
    }
}

fn parse_outcome(raw: &str) -> DispenserResult<Outcome> {
    match raw {
        "win" => Ok(Outcome::Win),
        "lose" => Ok(Outcome::Lose),
        other => Err(DispenserError::storage(
            "row_decode",
            format!("unexpected outcome value: {}", other),
        )),
    }
}

fn record_from_row(row: &PgRow) -> DispenserResult<TokenRecord> {
    let raw_id: String = row
        .try_get("token")
        .map_err(|e| DispenserError::storage("row_decode", e))?;
    let raw_outcome: String = row
        .try_get("result")
        .map_err(|e| DispenserError::storage("row_decode", e))?;

    Ok(TokenRecord {
        id: TokenId::parse(&raw_id)?,
        outcome: parse_outcome(&raw_outcome)?,
        assigned: row
            .try_get("assigned")
            .map_err(|e| DispenserError::storage("row_decode", e))?,
        assigned_at: row
            .try_get("assigned_at")
            .map_err(|e| DispenserError::storage("row_decode", e))?,
        redeemed: row
            .try_get("redeemed")
            .map_err(|e| DispenserError::storage("row_decode", e))?,
        redeemed_at: row
            .try_get("redeemed_at")
            .map_err(|e| DispenserError::storage("row_decode", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| DispenserError::storage("row_decode", e))?,
    })
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_tokens(&self, records: &[TokenRecord]) -> DispenserResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DispenserError::storage("insert_tokens", e))?;

        let mut inserted = 0u64;
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO tokens (token, result, assigned, redeemed, assigned_at, redeemed_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (token) DO NOTHING
                "#,
            )
            .bind(record.id.to_string())
            .bind(record.outcome.as_str())
            .bind(record.assigned)
            .bind(record.redeemed)
            .bind(record.assigned_at)
            .bind(record.redeemed_at)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| DispenserError::storage("insert_tokens", e))?;

            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DispenserError::storage("insert_tokens", e))?;

        Ok(inserted)
    }

    async fn claim_next_available(&self, now: DateTime<Utc>) -> DispenserResult<Option<TokenId>> {
        let row = sqlx::query(
            r#"
            WITH next_token AS (
                SELECT id FROM tokens
                WHERE NOT assigned AND NOT redeemed
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tokens
            SET assigned = TRUE, assigned_at = $1
            FROM next_token
            WHERE tokens.id = next_token.id
            RETURNING tokens.token
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("claim_next_available", e))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("token")
                    .map_err(|e| DispenserError::storage("row_decode", e))?;
                Ok(Some(TokenId::parse(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn release(&self, token: &TokenId) -> DispenserResult<()> {
        sqlx::query(
            r#"
            UPDATE tokens
            SET assigned = FALSE, assigned_at = NULL
            WHERE token = $1 AND NOT redeemed
            "#,
        )
        .bind(token.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("release", e))?;

        Ok(())
    }

    async fn get(&self, token: &TokenId) -> DispenserResult<Option<TokenRecord>> {
        let row = sqlx::query(
            r#"
            SELECT token, result, assigned, assigned_at, redeemed, redeemed_at, created_at
            FROM tokens
            WHERE token = $1
            "#,
        )
        .bind(token.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("get", e))?;

        row.map(|row| record_from_row(&row)).transpose()
    }

    async fn redeem(&self, token: &TokenId, now: DateTime<Utc>) -> DispenserResult<RedeemOutcome> {
        // Assignment is stamped alongside redemption so REDEEMED implies
        // ASSIGNED even for tokens that never went through a kiosk scan.
        let updated = sqlx::query(
            r#"
            UPDATE tokens
            SET redeemed = TRUE,
                redeemed_at = $2,
                assigned = TRUE,
                assigned_at = COALESCE(assigned_at, $2)
            WHERE token = $1 AND NOT redeemed
            RETURNING result
            "#,
        )
        .bind(token.to_string())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("redeem", e))?;

        if let Some(row) = updated {
            let raw_outcome: String = row
                .try_get("result")
                .map_err(|e| DispenserError::storage("row_decode", e))?;
            return Ok(RedeemOutcome::Redeemed {
                outcome: parse_outcome(&raw_outcome)?,
                redeemed_at: now,
            });
        }

        // Nothing updated: distinguish missing from already-consumed
        let existing = sqlx::query(
            r#"SELECT redeemed, redeemed_at FROM tokens WHERE token = $1"#,
        )
        .bind(token.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("redeem", e))?;

        match existing {
            None => Ok(RedeemOutcome::NotFound),
            Some(row) => {
                let redeemed: bool = row
                    .try_get("redeemed")
                    .map_err(|e| DispenserError::storage("row_decode", e))?;
                let redeemed_at: Option<DateTime<Utc>> = row
                    .try_get("redeemed_at")
                    .map_err(|e| DispenserError::storage("row_decode", e))?;

                if !redeemed {
                    // Only an administrative reset racing this call can get
                    // here; surface it rather than guess.
                    return Err(DispenserError::storage(
                        "redeem",
                        "token state changed mid-redemption",
                    ));
                }

                let redeemed_at = redeemed_at.ok_or_else(|| {
                    DispenserError::storage(
                        "redeem",
                        "redeemed token missing redemption timestamp",
                    )
                })?;
                Ok(RedeemOutcome::AlreadyRedeemed { redeemed_at })
            }
        }
    }

    async fn lookup_scan(
        &self,
        identity: &str,
        date: NaiveDate,
    ) -> DispenserResult<Option<TokenId>> {
        let row = sqlx::query(
            r#"SELECT token FROM daily_scans WHERE identity = $1 AND scan_date = $2"#,
        )
        .bind(identity)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("lookup_scan", e))?;

        match row {
            Some(row) => {
                let raw: String = row
                    .try_get("token")
                    .map_err(|e| DispenserError::storage("row_decode", e))?;
                Ok(Some(TokenId::parse(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn record_scan(
        &self,
        identity: &str,
        date: NaiveDate,
        token: &TokenId,
    ) -> DispenserResult<ScanInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO daily_scans (identity, scan_date, token)
            VALUES ($1, $2, $3)
            ON CONFLICT (identity, scan_date) DO NOTHING
            "#,
        )
        .bind(identity)
        .bind(date)
        .bind(token.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("record_scan", e))?;

        if result.rows_affected() == 1 {
            Ok(ScanInsert::Recorded)
        } else {
            Ok(ScanInsert::AlreadyRecorded)
        }
    }

    async fn max_batch_number(&self) -> DispenserResult<u32> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(CAST(split_part(token, '_', 1) AS INTEGER)), 0) AS max_batch
            FROM tokens
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DispenserError::storage("max_batch_number", e))?;

        let max_batch: i32 = row
            .try_get("max_batch")
            .map_err(|e| DispenserError::storage("row_decode", e))?;
        Ok(max_batch.max(0) as u32)
    }

    async fn reset_all(&self) -> DispenserResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DispenserError::storage("reset_all", e))?;

        let result = sqlx::query(
            r#"
            UPDATE tokens
            SET assigned = FALSE, redeemed = FALSE, assigned_at = NULL, redeemed_at = NULL
            WHERE assigned OR redeemed
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| DispenserError::storage("reset_all", e))?;

        sqlx::query(r#"DELETE FROM daily_scans"#)
            .execute(&mut *tx)
            .await
            .map_err(|e| DispenserError::storage("reset_all", e))?;

        tx.commit()
            .await
            .map_err(|e| DispenserError::storage("reset_all", e))?;

        Ok(result.rows_affected())
    }
}
