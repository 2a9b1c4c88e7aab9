//! Property-based tests for ledger invariants and batch layout

pub mod ledger_invariants;
