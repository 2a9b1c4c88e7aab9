//! Token records, identifiers, and the status view served to baristas

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispenserError;

/// Pre-determined scratch outcome, fixed at generation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
}

impl Outcome {
    /// Whether this token pays out a prize
    pub fn is_win(&self) -> bool {
        matches!(self, Outcome::Win)
    }

    /// Wire name for this outcome
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Lose => "lose",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier format: `<batchNumber>_<8 uppercase hex chars>`, no leading
/// zeros in the batch prefix so identifiers round-trip exactly.
fn token_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:0|[1-9][0-9]*)_[0-9A-F]{8}$").expect("token id pattern is valid")
    })
}

/// Globally unique token identifier
///
/// Parsing is the only way to build one from outside the generator, so a
/// `TokenId` in hand is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId {
    batch: u32,
    suffix: String,
}

impl TokenId {
    /// Parse and validate an identifier string
    pub fn parse(raw: &str) -> Result<Self, DispenserError> {
        if !token_id_pattern().is_match(raw) {
            return Err(DispenserError::InvalidTokenId(raw.to_string()));
        }

        let (prefix, suffix) = raw
            .split_once('_')
            .ok_or_else(|| DispenserError::InvalidTokenId(raw.to_string()))?;

        let batch = prefix
            .parse::<u32>()
            .map_err(|_| DispenserError::InvalidTokenId(raw.to_string()))?;

        Ok(Self {
            batch,
            suffix: suffix.to_string(),
        })
    }

    /// Mint a fresh identifier for a batch, drawing the hex suffix from a
    /// v4 UUID
    pub fn generate(batch_number: u32) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            batch: batch_number,
            suffix: hex[..8].to_uppercase(),
        }
    }

    /// Batch this token was generated in
    pub fn batch_number(&self) -> u32 {
        self.batch
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.batch, self.suffix)
    }
}

impl FromStr for TokenId {
    type Err = DispenserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenId::parse(s)
    }
}

impl TryFrom<String> for TokenId {
    type Error = DispenserError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TokenId::parse(&value)
    }
}

impl From<TokenId> for String {
    fn from(id: TokenId) -> Self {
        id.to_string()
    }
}

/// One scratch-card opportunity and its full lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: TokenId,
    pub outcome: Outcome,
    pub assigned: bool,
    pub assigned_at: Option<DateTime<Utc>>,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Fresh, unassigned, unredeemed token
    pub fn new(id: TokenId, outcome: Outcome, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            outcome,
            assigned: false,
            assigned_at: None,
            redeemed: false,
            redeemed_at: None,
            created_at,
        }
    }

    /// Eligible for claiming: neither assigned nor redeemed
    pub fn is_available(&self) -> bool {
        !self.assigned && !self.redeemed
    }

    /// UNASSIGNED -> ASSIGNED; no-op on an already assigned token
    pub fn mark_assigned(&mut self, now: DateTime<Utc>) {
        if !self.assigned {
            self.assigned = true;
            self.assigned_at = Some(now);
        }
    }

    /// UNREDEEMED -> REDEEMED. Also marks assignment so REDEEMED always
    /// implies ASSIGNED, even for a token walked straight to the counter.
    pub fn mark_redeemed(&mut self, now: DateTime<Utc>) {
        if !self.redeemed {
            self.redeemed = true;
            self.redeemed_at = Some(now);
            self.mark_assigned(now);
        }
    }

    /// Compensating release: ASSIGNED -> UNASSIGNED, only while unredeemed
    pub fn clear_assignment(&mut self) {
        if !self.redeemed {
            self.assigned = false;
            self.assigned_at = None;
        }
    }

    /// Administrative bulk reset: back to the initial state
    pub fn reset(&mut self) {
        self.assigned = false;
        self.assigned_at = None;
        self.redeemed = false;
        self.redeemed_at = None;
    }
}

/// Status view for the barista-facing query endpoint
///
/// JSON field names are the kiosk wire contract: unknown identifiers get
/// `{"valid": false}` and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenId>,
    #[serde(rename = "result", default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl TokenStatus {
    /// Status for an unknown or malformed identifier
    pub fn invalid() -> Self {
        Self {
            valid: false,
            token: None,
            outcome: None,
            assigned: None,
            assigned_at: None,
            redeemed: None,
            redeemed_at: None,
        }
    }

    /// Status for a known token
    pub fn from_record(record: &TokenRecord) -> Self {
        Self {
            valid: true,
            token: Some(record.id.clone()),
            outcome: Some(record.outcome),
            assigned: Some(record.assigned),
            assigned_at: record.assigned_at,
            redeemed: Some(record.redeemed),
            redeemed_at: record.redeemed_at,
        }
    }
}
