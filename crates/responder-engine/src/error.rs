// crates/responder-engine/src/error.rs
// ============================================================================
// Module: Engine Errors
// Description: Failure surface of the scheduler and its collaborators.
// Purpose: Separate caller-facing engine failures from per-step failures.
// Dependencies: responder-core, thiserror
// ============================================================================

//! ## Overview
//! Engine errors cover infrastructure failures (store, snapshot, approval
//! plumbing) and programming errors (illegal state transitions). Per-step
//! failures never surface here; they travel inside step results and decide
//! run continuation through `on_error` policies.

// ============================================================================
// SECTION: Imports
// ============================================================================

use responder_core::ApprovalError;
use responder_core::ContextError;
use responder_core::ExecutionId;
use responder_core::ExecutionState;
use responder_core::StoreError;
use responder_core::hashing::HashingError;
use thiserror::Error;

// ============================================================================
// SECTION: Engine Error
// ============================================================================

/// Failures surfaced by the scheduler and queue executor.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Context snapshot or restore failure.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Approval queue failure.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    /// Canonical JSON serialization failure.
    #[error(transparent)]
    Hashing(#[from] HashingError),
    /// Illegal state machine transition (`EXEC_STATE_INVALID`).
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: ExecutionState,
        /// Rejected target state.
        to: ExecutionState,
    },
    /// No persisted execution exists for the identifier.
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),
    /// The persisted execution is not parked on an approval.
    #[error("execution {execution_id} is not awaiting approval (state {state})")]
    NotAwaitingApproval {
        /// Execution identifier.
        execution_id: ExecutionId,
        /// State found instead.
        state: ExecutionState,
    },
}
