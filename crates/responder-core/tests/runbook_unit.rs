// crates/responder-core/tests/runbook_unit.rs
// ============================================================================
// Module: Runbook Validation Unit Tests
// Description: Targeted tests for runbook structural invariants and ordering.
// Purpose: Validate DAG checks and the authored-order topological sort.
// ============================================================================

//! ## Overview
//! Unit-level tests for runbook validation:
//! - Duplicate step ids, unknown dependencies, and self-edges are rejected
//! - Cycles are rejected
//! - The execution order respects dependencies and is stable in authored
//!   order among equal-rank steps

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use responder_core::Action;
use responder_core::AdapterName;
use responder_core::AutomationLevel;
use responder_core::OnErrorPolicy;
use responder_core::Runbook;
use responder_core::RunbookConfig;
use responder_core::RunbookId;
use responder_core::RunbookMetadata;
use responder_core::RunbookTriggers;
use responder_core::RunbookValidationError;
use responder_core::Step;
use responder_core::StepId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn step(id: &str, depends_on: &[&str]) -> Step {
    Step {
        id: StepId::new(id),
        name: format!("step {id}"),
        action: Action::CollectLogs,
        executor: AdapterName::new("siem"),
        parameters: BTreeMap::new(),
        depends_on: depends_on.iter().map(|dep| StepId::new(*dep)).collect::<BTreeSet<_>>(),
        condition: None,
        timeout: 30,
        on_error: OnErrorPolicy::Halt,
        approval_required: false,
        rollback: None,
    }
}

fn runbook(steps: Vec<Step>) -> Runbook {
    Runbook {
        id: RunbookId::new("rb-test"),
        version: "1.0.0".to_string(),
        name: "Test runbook".to_string(),
        metadata: RunbookMetadata::default(),
        triggers: RunbookTriggers::default(),
        config: RunbookConfig {
            automation_level: AutomationLevel::L1,
            max_execution_time: 600,
            requires_approval: false,
            approval_timeout: 3_600,
            parallel_execution: false,
            rollback_on_failure: false,
        },
        steps,
    }
}

// ============================================================================
// SECTION: Structural Invariants
// ============================================================================

#[test]
fn duplicate_step_ids_are_rejected() {
    let book = runbook(vec![step("a", &[]), step("a", &[])]);
    assert_eq!(
        book.validate(),
        Err(RunbookValidationError::DuplicateStepId(StepId::new("a")))
    );
}

#[test]
fn unknown_dependency_is_rejected() {
    let book = runbook(vec![step("a", &["ghost"])]);
    assert_eq!(
        book.validate(),
        Err(RunbookValidationError::UnknownDependency {
            step: StepId::new("a"),
            dependency: StepId::new("ghost"),
        })
    );
}

#[test]
fn self_dependency_is_rejected() {
    let book = runbook(vec![step("a", &["a"])]);
    assert_eq!(book.validate(), Err(RunbookValidationError::SelfDependency(StepId::new("a"))));
}

#[test]
fn dependency_cycles_are_rejected() {
    let book = runbook(vec![step("a", &["b"]), step("b", &["a"])]);
    assert!(matches!(book.validate(), Err(RunbookValidationError::DependencyCycle(_))));
}

#[test]
fn a_valid_dag_passes() {
    let book = runbook(vec![step("a", &[]), step("b", &["a"]), step("c", &["a", "b"])]);
    assert_eq!(book.validate(), Ok(()));
}

// ============================================================================
// SECTION: Execution Order
// ============================================================================

#[test]
fn execution_order_respects_dependencies() {
    let book = runbook(vec![step("c", &["a", "b"]), step("b", &["a"]), step("a", &[])]);
    let order: Vec<&str> = book
        .execution_order()
        .expect("order")
        .into_iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn equal_rank_steps_keep_authored_order() {
    let book = runbook(vec![
        step("root", &[]),
        step("zeta", &["root"]),
        step("alpha", &["root"]),
        step("mid", &["zeta", "alpha"]),
    ]);
    let order: Vec<&str> = book
        .execution_order()
        .expect("order")
        .into_iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(order, vec!["root", "zeta", "alpha", "mid"]);
}
