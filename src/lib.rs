//! Perk - promotional scratch-card token dispenser for coffee shop kiosks
//!
//! Perk hands out single-use scratch-card tokens from a kiosk QR code:
//! - Each visitor receives exactly one token per calendar day
//! - Each token is claimed by at most one visitor, in insertion order
//! - A winning token is redeemable exactly once, under concurrent scans
//! - Batches are generated with evenly distributed winners

pub mod token;
pub mod store;
pub mod dispenser;
pub mod error;
pub mod config;
#[cfg(feature = "server")]
pub mod http;

// Re-export commonly used types for convenience
pub use error::{DispenserError, DispenserResult};

// Re-export the token domain types
pub use token::{make_batch, BatchSummary, Outcome, TokenId, TokenRecord, TokenStatus};

// Re-export storage interfaces
pub use store::{MemoryStore, RedeemOutcome, ScanInsert, TokenStore};
#[cfg(feature = "postgres")]
pub use store::PgStore;

// Re-export the protocol front-end
pub use dispenser::{AllocationOutcome, Dispenser};

// Re-export configuration interfaces
pub use config::{BatchConfig, PerkConfig, ServerConfig, StoreConfig, TimeConfig};
