// crates/responder-core/src/core/context.rs
// ============================================================================
// Module: Responder Execution Context
// Description: Per-run mutable state, lifecycle states, and snapshot round-trips.
// Purpose: Capture everything the scheduler needs to drive, persist, and resume a run.
// Dependencies: serde, serde_json, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The execution context is the single mutable record of one runbook run:
//! lifecycle state, step bookkeeping, and the namespaced variable store the
//! template resolver reads. The context is exclusively owned by the scheduler
//! driving the run; everything else sees snapshots. Snapshots serialize to
//! JSON and restore by value, rejecting unknown states or modes so a
//! tampered or downlevel snapshot cannot resurrect an invalid run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::alert::AlertEvent;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::RunbookId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Execution Mode
// ============================================================================

/// Side-effect mode for one run or adapter invocation.
///
/// # Invariants
/// - Variants are stable for serialization and adapter dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Real side effects against external systems.
    Production,
    /// Predicted outcomes only; adapters must not mutate anything.
    Simulation,
    /// Validation only; no adapter calls at all.
    DryRun,
}

impl ExecutionMode {
    /// Returns the stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Simulation => "simulation",
            Self::DryRun => "dry_run",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Execution State
// ============================================================================

/// Lifecycle state of one runbook execution.
///
/// # Invariants
/// - Transitions are restricted to the graph encoded in [`Self::can_transition`].
/// - Terminal states are sticky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, not yet validated.
    Idle,
    /// Runbook invariants being verified.
    Validating,
    /// Execution order being computed.
    Planning,
    /// Run parked on a pending human approval.
    AwaitingApproval,
    /// Steps executing.
    Executing,
    /// Rollback pass in progress.
    RollingBack,
    /// Run finished successfully.
    Completed,
    /// Run finished with failure.
    Failed,
    /// Run cancelled externally.
    Cancelled,
}

impl ExecutionState {
    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true when the transition `self -> to` is allowed.
    #[must_use]
    pub const fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Validating)
                | (Self::Validating, Self::Planning | Self::Failed)
                | (Self::Planning, Self::Executing | Self::AwaitingApproval | Self::Failed)
                | (
                    Self::AwaitingApproval,
                    Self::Executing | Self::Failed | Self::Cancelled
                )
                | (
                    Self::Executing,
                    Self::RollingBack
                        | Self::Completed
                        | Self::Failed
                        | Self::Cancelled
                        | Self::AwaitingApproval
                )
                | (Self::RollingBack, Self::Completed | Self::Failed)
        )
    }

    /// Returns the stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Planning => "planning",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Executing => "executing",
            Self::RollingBack => "rolling_back",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Context Errors
// ============================================================================

/// Errors for context snapshot and restore operations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Snapshot serialization failed.
    #[error("context snapshot failed: {0}")]
    Snapshot(String),
    /// Snapshot restore failed validation or parsing.
    #[error("context restore failed: {0}")]
    Restore(String),
}

// ============================================================================
// SECTION: Execution Context
// ============================================================================

/// Per-run mutable state owned by the driving scheduler.
///
/// # Invariants
/// - `completed_steps` holds each processed step once, in record order
///   (authored order within a parallel wave); wall-clock completion times
///   live in the step results.
/// - `variables.steps.{id}.output` mirrors every recorded step output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: RunbookId,
    /// Runbook version string.
    pub runbook_version: String,
    /// Side-effect mode for the run.
    pub mode: ExecutionMode,
    /// Triggering alert, when present.
    pub alert: Option<AlertEvent>,
    /// Run start time.
    pub started_at: Timestamp,
    /// Step currently executing, when any.
    pub current_step: Option<StepId>,
    /// Processed step identifiers in record order.
    pub completed_steps: Vec<StepId>,
    /// Namespaced variable store read by the template resolver.
    pub variables: Map<String, Value>,
    /// Lifecycle state.
    pub state: ExecutionState,
    /// Terminal error message, when the run failed.
    pub error: Option<String>,
}

impl ExecutionContext {
    /// Creates a fresh context in the `Idle` state.
    #[must_use]
    pub fn new(
        runbook_id: RunbookId,
        runbook_version: impl Into<String>,
        mode: ExecutionMode,
        alert: Option<AlertEvent>,
    ) -> Self {
        Self {
            execution_id: ExecutionId::generate(),
            runbook_id,
            runbook_version: runbook_version.into(),
            mode,
            alert,
            started_at: Timestamp::now(),
            current_step: None,
            completed_steps: Vec::new(),
            variables: Map::new(),
            state: ExecutionState::Idle,
            error: None,
        }
    }

    /// Marks a step as currently executing.
    pub fn set_current_step(&mut self, id: StepId) {
        self.current_step = Some(id);
    }

    /// Records step completion; idempotent on repeat. Clears `current_step`
    /// when it matches the completed step.
    pub fn mark_step_completed(&mut self, id: &StepId) {
        if !self.completed_steps.contains(id) {
            self.completed_steps.push(id.clone());
        }
        if self.current_step.as_ref() == Some(id) {
            self.current_step = None;
        }
    }

    /// Records a step output and mirrors it into `variables.steps.{id}.output`.
    pub fn set_step_output(&mut self, id: &StepId, output: Value) {
        let steps = self
            .variables
            .entry("steps".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(steps_map) = steps {
            let entry = steps_map
                .entry(id.as_str().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(step_map) = entry {
                step_map.insert("output".to_string(), output);
            }
        }
    }

    /// Sets the lifecycle state. Transition legality is the scheduler's
    /// responsibility; the context records what it is told.
    pub const fn set_state(&mut self, state: ExecutionState) {
        self.state = state;
    }

    /// Records the terminal error message.
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Resolves a dotted path within the variable store.
    ///
    /// Pure lookup: two calls with the same path on an unchanged context
    /// return equal results.
    #[must_use]
    pub fn get_variable(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut cursor = self.variables.get(first)?;
        for segment in segments {
            cursor = cursor.as_object()?.get(segment)?;
        }
        Some(cursor)
    }

    /// Produces a deep-clone snapshot safe for persistence.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when serialization fails.
    pub fn snapshot(&self) -> Result<Value, ContextError> {
        serde_json::to_value(self).map_err(|err| ContextError::Snapshot(err.to_string()))
    }

    /// Restores a context from a previously serialized snapshot.
    ///
    /// Unknown states or modes are rejected by deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the snapshot is malformed.
    pub fn restore(snapshot: &Value) -> Result<Self, ContextError> {
        serde_json::from_value(snapshot.clone())
            .map_err(|err| ContextError::Restore(err.to_string()))
    }
}
