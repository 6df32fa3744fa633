// crates/responder-engine/src/audit.rs
// ============================================================================
// Module: Audit Logger
// Description: Typed audit event writer over the hash-chained audit store.
// Purpose: Give the engine one place that freezes details and derives success.
// Dependencies: responder-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The audit logger freezes event details to canonical JSON before handing
//! them to the store, so the bytes covered by the chain hash are exactly the
//! bytes persisted. The store performs the previous-hash lookup and insert
//! in one transaction; this layer only shapes events and derives the
//! `success` flag from the event type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use responder_core::AuditEntry;
use responder_core::AuditEventType;
use responder_core::AuditStore;
use responder_core::ChainVerification;
use responder_core::ExecutionId;
use responder_core::NewAuditEntry;
use responder_core::RunbookId;
use responder_core::StoreError;
use responder_core::Timestamp;
use responder_core::hashing::HashingError;
use responder_core::hashing::canonical_json_bytes;
use responder_core::verify_chain;
use serde_json::Value;
use tracing::debug;

// ============================================================================
// SECTION: Audit Logger
// ============================================================================

/// Default actor recorded for engine-originated events.
pub const ENGINE_ACTOR: &str = "engine";

/// Typed audit event writer.
///
/// # Invariants
/// - Details are canonical JSON; the store hashes exactly these bytes.
#[derive(Clone)]
pub struct AuditLogger {
    /// Underlying hash-chained store.
    store: Arc<dyn AuditStore>,
}

impl AuditLogger {
    /// Creates a logger over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
        }
    }

    /// Records one event with the engine actor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when freezing or the append fails.
    pub fn record(
        &self,
        execution_id: ExecutionId,
        runbook_id: &RunbookId,
        event_type: AuditEventType,
        details: &Value,
    ) -> Result<AuditEntry, StoreError> {
        self.record_as(execution_id, runbook_id, event_type, ENGINE_ACTOR, details)
    }

    /// Records one event with an explicit actor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when freezing or the append fails.
    pub fn record_as(
        &self,
        execution_id: ExecutionId,
        runbook_id: &RunbookId,
        event_type: AuditEventType,
        actor: &str,
        details: &Value,
    ) -> Result<AuditEntry, StoreError> {
        let details_json = freeze_details(details)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        debug!(
            execution_id = %execution_id,
            event = event_type.as_str(),
            actor,
            "audit event"
        );
        self.store.append_audit(NewAuditEntry {
            timestamp: Timestamp::now(),
            execution_id,
            runbook_id: runbook_id.clone(),
            event_type,
            actor: actor.to_string(),
            details_json,
            success: event_type.derived_success(),
        })
    }

    /// Returns an execution's audit log in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn execution_log(&self, execution_id: ExecutionId) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.get_execution_log(execution_id)
    }

    /// Replays an execution's chain and reports the first broken row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn verify_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<ChainVerification, StoreError> {
        let entries = self.store.get_execution_log(execution_id)?;
        Ok(verify_chain(&entries))
    }
}

/// Freezes details to a canonical JSON string.
fn freeze_details(details: &Value) -> Result<String, HashingError> {
    let bytes = canonical_json_bytes(details)?;
    String::from_utf8(bytes).map_err(|err| HashingError::Canonicalize(err.to_string()))
}
