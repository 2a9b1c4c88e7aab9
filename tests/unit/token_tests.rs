//! Unit tests for token identifiers, records, and the status view

use chrono::Utc;
use perk::error::DispenserError;
use perk::token::{Outcome, TokenId, TokenRecord, TokenStatus};

#[test]
fn test_token_id_parse_roundtrip() {
    let id = TokenId::parse("3_A1B2C3D4").unwrap();
    assert_eq!(id.batch_number(), 3);
    assert_eq!(id.to_string(), "3_A1B2C3D4");
}

#[test]
fn test_token_id_rejects_malformed_input() {
    for raw in [
        "",
        "3",
        "3_",
        "_A1B2C3D4",
        "3_A1B2C3",      // 7 hex chars
        "3_A1B2C3D4E",   // 9 hex chars
        "3_a1b2c3d4",    // lowercase hex
        "3_A1B2C3DZ",    // non-hex char
        "03_A1B2C3D4",   // leading zero would not round-trip
        "3-A1B2C3D4",
        "3_A1B2 3D4",
    ] {
        let result = TokenId::parse(raw);
        assert!(
            matches!(result, Err(DispenserError::InvalidTokenId(_))),
            "expected rejection for {:?}",
            raw
        );
    }
}

#[test]
fn test_token_id_zero_batch_is_valid() {
    let id = TokenId::parse("0_DEADBEEF").unwrap();
    assert_eq!(id.batch_number(), 0);
}

#[test]
fn test_generated_id_is_well_formed() {
    let id = TokenId::generate(12);
    assert_eq!(id.batch_number(), 12);

    // A generated identifier always parses back to itself
    let reparsed = TokenId::parse(&id.to_string()).unwrap();
    assert_eq!(reparsed, id);
}

#[test]
fn test_token_id_serde_as_string() {
    let id = TokenId::parse("5_00FF00FF").unwrap();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"5_00FF00FF\"");

    let back: TokenId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);

    let bad: Result<TokenId, _> = serde_json::from_str("\"not-a-token\"");
    assert!(bad.is_err());
}

#[test]
fn test_outcome_wire_names() {
    assert_eq!(serde_json::to_string(&Outcome::Win).unwrap(), "\"win\"");
    assert_eq!(serde_json::to_string(&Outcome::Lose).unwrap(), "\"lose\"");
    assert!(Outcome::Win.is_win());
    assert!(!Outcome::Lose.is_win());
}

#[test]
fn test_record_assignment_is_monotonic() {
    let mut record = TokenRecord::new(TokenId::generate(1), Outcome::Lose, Utc::now());
    assert!(record.is_available());

    let t1 = Utc::now();
    record.mark_assigned(t1);
    assert!(record.assigned);
    assert_eq!(record.assigned_at, Some(t1));
    assert!(!record.is_available());

    // A second assignment must not move the timestamp
    record.mark_assigned(Utc::now());
    assert_eq!(record.assigned_at, Some(t1));
}

#[test]
fn test_redeeming_unassigned_record_keeps_invariant() {
    let mut record = TokenRecord::new(TokenId::generate(1), Outcome::Win, Utc::now());

    let t1 = Utc::now();
    record.mark_redeemed(t1);

    assert!(record.redeemed);
    assert_eq!(record.redeemed_at, Some(t1));
    // REDEEMED implies ASSIGNED, even without a kiosk scan
    assert!(record.assigned);
    assert_eq!(record.assigned_at, Some(t1));
}

#[test]
fn test_release_never_unassigns_redeemed_record() {
    let mut record = TokenRecord::new(TokenId::generate(1), Outcome::Win, Utc::now());
    record.mark_assigned(Utc::now());
    record.mark_redeemed(Utc::now());

    record.clear_assignment();
    assert!(record.assigned);
    assert!(record.redeemed);
}

#[test]
fn test_reset_returns_record_to_initial_state() {
    let created = Utc::now();
    let mut record = TokenRecord::new(TokenId::generate(1), Outcome::Win, created);
    record.mark_assigned(Utc::now());
    record.mark_redeemed(Utc::now());

    record.reset();

    assert!(record.is_available());
    assert_eq!(record.assigned_at, None);
    assert_eq!(record.redeemed_at, None);
    assert_eq!(record.created_at, created);
    // Outcome is fixed at creation and survives the reset
    assert!(record.outcome.is_win());
}

#[test]
fn test_invalid_status_serializes_bare() {
    let value = serde_json::to_value(TokenStatus::invalid()).unwrap();
    assert_eq!(value, serde_json::json!({ "valid": false }));
}

#[test]
fn test_status_uses_wire_field_names() {
    let mut record = TokenRecord::new(TokenId::parse("1_ABCDEF01").unwrap(), Outcome::Win, Utc::now());
    record.mark_assigned(Utc::now());

    let value = serde_json::to_value(TokenStatus::from_record(&record)).unwrap();

    assert_eq!(value["valid"], serde_json::json!(true));
    assert_eq!(value["token"], serde_json::json!("1_ABCDEF01"));
    assert_eq!(value["result"], serde_json::json!("win"));
    assert_eq!(value["assigned"], serde_json::json!(true));
    assert!(value.get("assignedAt").is_some());
    assert_eq!(value["redeemed"], serde_json::json!(false));
    assert!(value.get("redeemedAt").is_none());
}
