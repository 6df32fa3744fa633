// crates/responder-core/src/core/result.rs
// ============================================================================
// Module: Responder Execution Results
// Description: Immutable per-step and per-run outcome records.
// Purpose: Capture what actually happened for persistence, audit, and callers.
// Dependencies: serde, serde_json, crate::core
// ============================================================================

//! ## Overview
//! A [`StepResult`] is created once per attempted step and never mutated
//! afterwards (the single exception is the `rolled_back` flag, which the
//! scheduler stamps during the rollback pass before the run seals). The
//! [`ExecutionResult`] is the terminal aggregate returned to callers and
//! persisted with the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::action::Action;
use crate::core::context::ExecutionState;
use crate::core::error::StepError;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::RunbookId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Step Result
// ============================================================================

/// Immutable record of one attempted step execution.
///
/// # Invariants
/// - `duration_ms` is wall-clock between `started_at` and `completed_at`.
/// - Exactly one of `output` / `error` is populated for executed steps; both
///   are absent for skipped or plan-only steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step identifier.
    pub step_id: StepId,
    /// Human-readable step name.
    pub step_name: String,
    /// Action attempted.
    pub action: Action,
    /// Whether the step succeeded.
    pub success: bool,
    /// Whether the step was skipped (condition false, `on_error = skip`, or
    /// plan-only gating).
    pub skipped: bool,
    /// Start time.
    pub started_at: Timestamp,
    /// Completion time.
    pub completed_at: Timestamp,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Adapter output, when the step produced one.
    pub output: Option<Value>,
    /// Failure details, when the step failed.
    pub error: Option<StepError>,
    /// True once the rollback pass replayed this step's inverse action.
    pub rolled_back: bool,
}

// ============================================================================
// SECTION: Execution Metrics
// ============================================================================

/// Aggregate counters for one run.
///
/// # Invariants
/// - `steps_total = steps_succeeded + steps_failed + steps_skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExecutionMetrics {
    /// Steps attempted, skipped, or planned.
    pub steps_total: u64,
    /// Steps that succeeded.
    pub steps_succeeded: u64,
    /// Steps that failed.
    pub steps_failed: u64,
    /// Steps skipped by condition, policy, or plan-only gating.
    pub steps_skipped: u64,
    /// Rollback invocations performed.
    pub rollbacks: u64,
}

impl ExecutionMetrics {
    /// Folds one step result into the counters.
    pub const fn record(&mut self, success: bool, skipped: bool) {
        self.steps_total += 1;
        if skipped {
            self.steps_skipped += 1;
        } else if success {
            self.steps_succeeded += 1;
        } else {
            self.steps_failed += 1;
        }
    }
}

// ============================================================================
// SECTION: Execution Result
// ============================================================================

/// Terminal aggregate for one runbook execution.
///
/// # Invariants
/// - `state` is terminal.
/// - `steps_executed` preserves attempt order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: RunbookId,
    /// Whether the run completed successfully.
    pub success: bool,
    /// Terminal lifecycle state.
    pub state: ExecutionState,
    /// Run start time.
    pub started_at: Timestamp,
    /// Run completion time.
    pub completed_at: Timestamp,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Per-step results in attempt order.
    pub steps_executed: Vec<StepResult>,
    /// Terminal error message, when the run failed.
    pub error: Option<String>,
    /// Aggregate counters.
    pub metrics: ExecutionMetrics,
}
