// crates/responder-core/tests/classifier_unit.rs
// ============================================================================
// Module: Action Classifier Unit Tests
// Description: Targeted tests for the read/write action partition.
// Purpose: Validate total, disjoint classification and stable wire names.
// ============================================================================

//! ## Overview
//! Unit-level tests for the action catalog:
//! - The partition is total and disjoint over all 33 symbols
//! - Canonical read membership matches the documented set
//! - Wire names round-trip through serde

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;

use responder_core::Action;
use responder_core::ActionKind;

// ============================================================================
// SECTION: Partition
// ============================================================================

#[test]
fn every_action_classifies_exactly_once() {
    let mut read = BTreeSet::new();
    let mut write = BTreeSet::new();
    for action in Action::ALL {
        match action.kind() {
            ActionKind::Read => read.insert(action),
            ActionKind::Write => write.insert(action),
        };
    }
    assert_eq!(read.len() + write.len(), Action::ALL.len());
    assert!(read.intersection(&write).next().is_none());
}

#[test]
fn canonical_read_set_matches_documentation() {
    let read: BTreeSet<&str> = Action::ALL
        .into_iter()
        .filter(|action| !action.is_write())
        .map(Action::as_str)
        .collect();
    let expected: BTreeSet<&str> = [
        "collect_logs",
        "query_siem",
        "collect_network_traffic",
        "snapshot_memory",
        "collect_file_metadata",
        "enrich_ioc",
        "check_reputation",
        "query_threat_feed",
        "retrieve_edr_data",
        "calculate_hash",
        "http_request",
        "wait",
    ]
    .into_iter()
    .collect();
    assert_eq!(read, expected);
}

#[test]
fn containment_actions_are_writes() {
    assert!(Action::IsolateHost.is_write());
    assert!(Action::BlockIp.is_write());
    assert!(Action::DisableAccount.is_write());
    assert!(Action::NotifySlack.is_write());
}

// ============================================================================
// SECTION: Wire Names
// ============================================================================

#[test]
fn wire_names_round_trip_through_serde() {
    for action in Action::ALL {
        let encoded = serde_json::to_string(&action).expect("serialize");
        assert_eq!(encoded, format!("\"{}\"", action.as_str()));
        let decoded: Action = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, action);
    }
}

#[test]
fn unknown_action_symbols_are_rejected() {
    assert!(serde_json::from_str::<Action>("\"launch_missiles\"").is_err());
}
