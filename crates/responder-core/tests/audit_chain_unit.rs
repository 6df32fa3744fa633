// crates/responder-core/tests/audit_chain_unit.rs
// ============================================================================
// Module: Audit Chain Unit Tests
// Description: Targeted tests for the hash rule and offline verification.
// Purpose: Validate chain linkage, derived success, and tamper localization.
// ============================================================================

//! ## Overview
//! Unit-level tests for the audit chain model:
//! - The hash preimage is `prev|event|execution|details|timestamp`
//! - The first entry carries an empty previous hash
//! - Verification reports the first tampered row
//! - `success` derives from the event type

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use responder_core::AuditEntry;
use responder_core::AuditEventType;
use responder_core::ExecutionId;
use responder_core::RunbookId;
use responder_core::Timestamp;
use responder_core::hashing::audit_entry_hash;
use responder_core::verify_chain;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn execution_id() -> ExecutionId {
    ExecutionId::parse("9f2c6f0a-1f4e-4f88-9a75-0f3a4a2b1c5d").expect("uuid")
}

fn chained_entries(events: &[(AuditEventType, &str)]) -> Vec<AuditEntry> {
    let execution_id = execution_id();
    let mut prev_hash = String::new();
    let mut entries = Vec::new();
    for (index, (event_type, details)) in events.iter().enumerate() {
        let timestamp =
            Timestamp::from_unix_millis(1_767_225_600_000 + i64::try_from(index).expect("index"))
                .expect("timestamp");
        let hash = audit_entry_hash(
            &prev_hash,
            event_type.as_str(),
            &execution_id.to_string(),
            details,
            &timestamp.to_rfc3339(),
        );
        entries.push(AuditEntry {
            id: i64::try_from(index).expect("index") + 1,
            timestamp,
            execution_id,
            runbook_id: RunbookId::new("rb-test"),
            event_type: *event_type,
            actor: "engine".to_string(),
            details_json: (*details).to_string(),
            success: event_type.derived_success(),
            prev_hash: prev_hash.clone(),
            hash: hash.clone(),
        });
        prev_hash = hash;
    }
    entries
}

fn sample_chain() -> Vec<AuditEntry> {
    chained_entries(&[
        (AuditEventType::ExecutionStarted, "{\"mode\":\"production\"}"),
        (AuditEventType::StateChanged, "{\"from\":\"idle\",\"to\":\"validating\"}"),
        (AuditEventType::StepStarted, "{\"step_id\":\"s1\"}"),
        (AuditEventType::StepCompleted, "{\"step_id\":\"s1\"}"),
        (AuditEventType::ExecutionCompleted, "{\"state\":\"completed\"}"),
    ])
}

// ============================================================================
// SECTION: Hash Rule
// ============================================================================

#[test]
fn hash_covers_the_pipe_delimited_preimage() {
    let hash = audit_entry_hash("prev", "step_started", "exec", "{}", "2026-01-01T00:00:00Z");
    let again = audit_entry_hash("prev", "step_started", "exec", "{}", "2026-01-01T00:00:00Z");
    assert_eq!(hash, again);
    // Moving a byte between fields must change the digest: the delimiter is
    // part of the preimage.
    let shifted = audit_entry_hash("prevs", "tep_started", "exec", "{}", "2026-01-01T00:00:00Z");
    assert_ne!(hash, shifted);
}

#[test]
fn first_entry_has_empty_prev_hash_and_chain_verifies() {
    let entries = sample_chain();
    assert!(entries[0].prev_hash.is_empty());
    let verification = verify_chain(&entries);
    assert!(verification.valid);
    assert_eq!(verification.entries_checked, 5);
    assert_eq!(verification.first_invalid, None);
}

#[test]
fn recompute_hash_matches_stored_hash() {
    for entry in sample_chain() {
        assert_eq!(entry.recompute_hash(), entry.hash);
    }
}

// ============================================================================
// SECTION: Tamper Detection
// ============================================================================

#[test]
fn mutating_details_breaks_the_chain_at_that_row() {
    let mut entries = sample_chain();
    entries[2].details_json = "{\"step_id\":\"s1\",\"forged\":true}".to_string();
    let verification = verify_chain(&entries);
    assert!(!verification.valid);
    assert_eq!(verification.first_invalid, Some(2));
}

#[test]
fn earlier_rows_stay_valid_when_a_later_row_is_tampered() {
    let mut entries = sample_chain();
    entries[4].details_json = "{\"state\":\"failed\"}".to_string();
    let verification = verify_chain(&entries);
    assert_eq!(verification.first_invalid, Some(4));
    let prefix = verify_chain(&entries[.. 4]);
    assert!(prefix.valid);
}

#[test]
fn relinking_a_forged_row_still_breaks_linkage_downstream() {
    let mut entries = sample_chain();
    // Forge row 2 and recompute its own hash; row 3's prev_hash no longer
    // matches, so the break is localized one row later.
    entries[2].details_json = "{\"step_id\":\"s1\",\"forged\":true}".to_string();
    entries[2].hash = entries[2].recompute_hash();
    let verification = verify_chain(&entries);
    assert!(!verification.valid);
    assert_eq!(verification.first_invalid, Some(3));
}

// ============================================================================
// SECTION: Derived Success
// ============================================================================

#[test]
fn failed_events_and_denials_are_unsuccessful() {
    assert!(!AuditEventType::ExecutionFailed.derived_success());
    assert!(!AuditEventType::StepFailed.derived_success());
    assert!(!AuditEventType::RollbackFailed.derived_success());
    assert!(!AuditEventType::SimulationFailed.derived_success());
    assert!(!AuditEventType::ApprovalDenied.derived_success());
    assert!(AuditEventType::ApprovalExpired.derived_success());
    assert!(AuditEventType::StepCompleted.derived_success());
}
