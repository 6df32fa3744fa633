// crates/responder-core/src/core/audit.rs
// ============================================================================
// Module: Responder Audit Model
// Description: Hash-chained audit entries and offline chain verification.
// Purpose: Provide tamper evidence for every execution's event history.
// Dependencies: serde, serde_json, crate::core::{hashing, identifiers, time}
// ============================================================================

//! ## Overview
//! Audit entries are append-only and hash-chained per execution: each entry's
//! hash covers the previous entry's hash, so mutating any stored row breaks
//! every subsequent link. Verification replays the chain and reports the
//! first broken row. The `success` flag is derived from the event type
//! (`*_failed` and `approval_denied` are unsuccessful), never supplied by
//! callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::audit_entry_hash;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::RunbookId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Audit event types emitted by the engine.
///
/// # Invariants
/// - Wire names are stable snake_case strings; the hash preimage uses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Run admitted and started.
    ExecutionStarted,
    /// Run reached `completed`.
    ExecutionCompleted,
    /// Run reached `failed`.
    ExecutionFailed,
    /// Step dispatched.
    StepStarted,
    /// Step finished successfully.
    StepCompleted,
    /// Step finished with failure.
    StepFailed,
    /// Approval requested for a gated step.
    ApprovalRequested,
    /// Approval granted by a human.
    ApprovalGranted,
    /// Approval denied by a human.
    ApprovalDenied,
    /// Approval expired before a decision.
    ApprovalExpired,
    /// Rollback pass started.
    RollbackStarted,
    /// Rollback pass finished.
    RollbackCompleted,
    /// A rollback invocation failed.
    RollbackFailed,
    /// Scheduler state transition.
    StateChanged,
    /// Simulation pass started.
    SimulationStarted,
    /// Simulation pass finished.
    SimulationCompleted,
    /// Simulation pass failed.
    SimulationFailed,
    /// One step simulated.
    StepSimulated,
    /// Approval queue entry created.
    ApprovalQueueCreated,
    /// Approved entry executed in production.
    ApprovalQueueExecuted,
}

impl AuditEventType {
    /// Returns the stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecutionStarted => "execution_started",
            Self::ExecutionCompleted => "execution_completed",
            Self::ExecutionFailed => "execution_failed",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::ApprovalRequested => "approval_requested",
            Self::ApprovalGranted => "approval_granted",
            Self::ApprovalDenied => "approval_denied",
            Self::ApprovalExpired => "approval_expired",
            Self::RollbackStarted => "rollback_started",
            Self::RollbackCompleted => "rollback_completed",
            Self::RollbackFailed => "rollback_failed",
            Self::StateChanged => "state_changed",
            Self::SimulationStarted => "simulation_started",
            Self::SimulationCompleted => "simulation_completed",
            Self::SimulationFailed => "simulation_failed",
            Self::StepSimulated => "step_simulated",
            Self::ApprovalQueueCreated => "approval_queue_created",
            Self::ApprovalQueueExecuted => "approval_queue_executed",
        }
    }

    /// Derives the `success` flag recorded with the entry.
    #[must_use]
    pub fn derived_success(self) -> bool {
        let name = self.as_str();
        !(name.ends_with("_failed") || matches!(self, Self::ApprovalDenied))
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Audit Entry
// ============================================================================

/// One row of the hash-chained audit journal.
///
/// # Invariants
/// - `hash = SHA-256(prev_hash|event_type|execution_id|details_json|timestamp)`.
/// - `prev_hash` is empty for the first entry of an execution.
/// - Entries are append-only; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row identifier assigned by the store.
    pub id: i64,
    /// Entry timestamp.
    pub timestamp: Timestamp,
    /// Execution this entry belongs to.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: RunbookId,
    /// Event type.
    pub event_type: AuditEventType,
    /// Acting identity (`engine`, an approver, an adapter name).
    pub actor: String,
    /// Canonical JSON details; the exact bytes covered by the hash.
    pub details_json: String,
    /// Derived success flag.
    pub success: bool,
    /// Hash of the previous entry for this execution; empty for the first.
    pub prev_hash: String,
    /// Hash of this entry.
    pub hash: String,
}

impl AuditEntry {
    /// Recomputes this entry's hash from its recorded fields.
    #[must_use]
    pub fn recompute_hash(&self) -> String {
        audit_entry_hash(
            &self.prev_hash,
            self.event_type.as_str(),
            &self.execution_id.to_string(),
            &self.details_json,
            &self.timestamp.to_rfc3339(),
        )
    }
}

// ============================================================================
// SECTION: Chain Verification
// ============================================================================

/// Outcome of replaying an execution's audit chain.
///
/// # Invariants
/// - `first_invalid` is the index of the first row whose hash or linkage
///   does not verify; all later rows are reported invalid as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Whether every row verified.
    pub valid: bool,
    /// Rows checked.
    pub entries_checked: usize,
    /// Index of the first broken row, when any.
    pub first_invalid: Option<usize>,
}

/// Replays an audit chain and reports the first broken row.
///
/// Entries must be supplied in insertion order for a single execution.
#[must_use]
pub fn verify_chain(entries: &[AuditEntry]) -> ChainVerification {
    let mut expected_prev = String::new();
    for (index, entry) in entries.iter().enumerate() {
        if entry.prev_hash != expected_prev || entry.recompute_hash() != entry.hash {
            return ChainVerification {
                valid: false,
                entries_checked: entries.len(),
                first_invalid: Some(index),
            };
        }
        expected_prev.clone_from(&entry.hash);
    }
    ChainVerification {
        valid: true,
        entries_checked: entries.len(),
        first_invalid: None,
    }
}
