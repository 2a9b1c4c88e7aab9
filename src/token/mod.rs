//! Token domain types and batch generation

pub mod record;
pub mod batch;

pub use record::{Outcome, TokenId, TokenRecord, TokenStatus};
pub use batch::{make_batch, BatchSummary};
