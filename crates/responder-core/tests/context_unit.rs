// crates/responder-core/tests/context_unit.rs
// ============================================================================
// Module: Execution Context Unit Tests
// Description: Targeted tests for context mutation and snapshot round-trips.
// Purpose: Validate bookkeeping idempotence, state transitions, and restore
//          rejection of unknown states.
// ============================================================================

//! ## Overview
//! Unit-level tests for the execution context:
//! - `mark_step_completed` is idempotent and clears a matching current step
//! - Step outputs mirror into `variables.steps.{id}.output`
//! - Snapshot/restore round-trips by value
//! - Restore rejects unknown states and modes
//! - The transition table matches the documented graph

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use responder_core::ExecutionContext;
use responder_core::ExecutionMode;
use responder_core::ExecutionState;
use responder_core::RunbookId;
use responder_core::StepId;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn fresh_context() -> ExecutionContext {
    ExecutionContext::new(RunbookId::new("rb-test"), "1.0.0", ExecutionMode::Production, None)
}

// ============================================================================
// SECTION: Step Bookkeeping
// ============================================================================

#[test]
fn mark_step_completed_is_idempotent() {
    let mut ctx = fresh_context();
    let id = StepId::new("s1");
    ctx.mark_step_completed(&id);
    ctx.mark_step_completed(&id);
    assert_eq!(ctx.completed_steps, vec![id]);
}

#[test]
fn completion_clears_a_matching_current_step() {
    let mut ctx = fresh_context();
    ctx.set_current_step(StepId::new("s1"));
    ctx.mark_step_completed(&StepId::new("s1"));
    assert_eq!(ctx.current_step, None);

    ctx.set_current_step(StepId::new("s2"));
    ctx.mark_step_completed(&StepId::new("s3"));
    assert_eq!(ctx.current_step, Some(StepId::new("s2")));
}

#[test]
fn step_output_mirrors_into_variables() {
    let mut ctx = fresh_context();
    ctx.set_step_output(&StepId::new("s1"), json!({"count": 42}));
    assert_eq!(ctx.get_variable("steps.s1.output.count"), Some(&json!(42)));
    // Overwrite replaces the output wholesale.
    ctx.set_step_output(&StepId::new("s1"), json!({"count": 43}));
    assert_eq!(ctx.get_variable("steps.s1.output.count"), Some(&json!(43)));
}

// ============================================================================
// SECTION: Snapshot Round-Trip
// ============================================================================

#[test]
fn snapshot_then_restore_round_trips_by_value() {
    let mut ctx = fresh_context();
    ctx.set_state(ExecutionState::Validating);
    ctx.set_current_step(StepId::new("s2"));
    ctx.mark_step_completed(&StepId::new("s1"));
    ctx.set_step_output(&StepId::new("s1"), json!({"hosts": ["ws-42"]}));
    ctx.set_error("partial failure");

    let snapshot = ctx.snapshot().expect("snapshot");
    let restored = ExecutionContext::restore(&snapshot).expect("restore");
    assert_eq!(restored, ctx);
    assert_eq!(restored.get_variable("steps.s1.output.hosts"), Some(&json!(["ws-42"])));
}

#[test]
fn restore_rejects_unknown_states_and_modes() {
    let ctx = fresh_context();
    let mut snapshot = ctx.snapshot().expect("snapshot");
    snapshot["state"] = json!("daydreaming");
    assert!(ExecutionContext::restore(&snapshot).is_err());

    let mut snapshot = ctx.snapshot().expect("snapshot");
    snapshot["mode"] = json!("yolo");
    assert!(ExecutionContext::restore(&snapshot).is_err());
}

// ============================================================================
// SECTION: Transition Table
// ============================================================================

#[test]
fn documented_transitions_are_allowed() {
    use ExecutionState::{
        AwaitingApproval, Cancelled, Completed, Executing, Failed, Idle, Planning, RollingBack,
        Validating,
    };
    assert!(Idle.can_transition(Validating));
    assert!(Validating.can_transition(Planning));
    assert!(Planning.can_transition(Executing));
    assert!(Planning.can_transition(AwaitingApproval));
    assert!(AwaitingApproval.can_transition(Executing));
    assert!(AwaitingApproval.can_transition(Failed));
    assert!(AwaitingApproval.can_transition(Cancelled));
    assert!(Executing.can_transition(RollingBack));
    assert!(Executing.can_transition(Completed));
    assert!(Executing.can_transition(Failed));
    assert!(Executing.can_transition(Cancelled));
    assert!(RollingBack.can_transition(Completed));
    assert!(RollingBack.can_transition(Failed));
}

#[test]
fn illegal_transitions_are_rejected() {
    use ExecutionState::{Completed, Executing, Failed, Idle, Planning, Validating};
    assert!(!Idle.can_transition(Executing));
    assert!(!Completed.can_transition(Executing));
    assert!(!Failed.can_transition(Planning));
    assert!(!Executing.can_transition(Validating));
    assert!(!Planning.can_transition(Idle));
}

#[test]
fn terminal_states_are_sticky() {
    use ExecutionState::{Cancelled, Completed, Failed};
    for terminal in [Completed, Failed, Cancelled] {
        assert!(terminal.is_terminal());
        for target in [
            ExecutionState::Idle,
            ExecutionState::Validating,
            ExecutionState::Planning,
            ExecutionState::AwaitingApproval,
            ExecutionState::Executing,
            ExecutionState::RollingBack,
            Completed,
            Failed,
            Cancelled,
        ] {
            assert!(!terminal.can_transition(target));
        }
    }
}
