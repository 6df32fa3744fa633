// crates/responder-engine/tests/simulation_unit.rs
// ============================================================================
// Module: Simulation Engine Unit Tests
// Description: Targeted tests for simulated steps and report aggregation.
// Purpose: Validate no-side-effect execution, risk/confidence aggregation,
//          outcome classification, and rollback coverage.
// ============================================================================

//! ## Overview
//! Unit-level tests for the simulation engine:
//! - Adapters are invoked in simulation mode only
//! - Risk aggregates by maximum; confidence by product
//! - Outcomes classify as SUCCESS / PARTIAL / FAILURE
//! - The rollback plan is available only under full write coverage

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use responder_adapters::AdapterRegistry;
use responder_adapters::ScriptedAdapter;
use responder_adapters::ScriptedOutcome;
use responder_core::Action;
use responder_core::AdapterConfig;
use responder_core::AdapterName;
use responder_core::ErrorCode;
use responder_core::ExecutionContext;
use responder_core::ExecutionMode;
use responder_core::OnErrorPolicy;
use responder_core::PredictedOutcome;
use responder_core::RiskLevel;
use responder_core::RollbackDefinition;
use responder_core::RunbookId;
use responder_core::Step;
use responder_core::StepId;
use responder_core::TemplateContext;
use responder_core::baseline_risk_score;
use responder_engine::SimulationEngine;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

async fn engine_with(adapters: Vec<Arc<ScriptedAdapter>>) -> SimulationEngine {
    let registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter, AdapterConfig::default()).await.expect("register");
    }
    SimulationEngine::new(registry.resolver())
}

fn template() -> TemplateContext {
    let ctx =
        ExecutionContext::new(RunbookId::new("rb-sim"), "1.0.0", ExecutionMode::Simulation, None);
    TemplateContext::from_execution(&ctx)
}

fn step(id: &str, action: Action, executor: &str, rollback: Option<Action>) -> Step {
    let mut parameters = BTreeMap::new();
    parameters.insert("host".to_string(), json!("ws-42"));
    Step {
        id: StepId::new(id),
        name: format!("step {id}"),
        action,
        executor: AdapterName::new(executor),
        parameters,
        depends_on: BTreeSet::new(),
        condition: None,
        timeout: 10,
        on_error: OnErrorPolicy::Halt,
        approval_required: false,
        rollback: rollback.map(|action| RollbackDefinition {
            action,
            executor: None,
            parameters: BTreeMap::new(),
            timeout: 10,
            on_error: None,
        }),
    }
}

// ============================================================================
// SECTION: Side-Effect Freedom
// ============================================================================

#[tokio::test]
async fn simulation_only_calls_adapters_in_simulation_mode() {
    let edr = Arc::new(ScriptedAdapter::new("edr", [Action::IsolateHost]));
    let engine = engine_with(vec![Arc::clone(&edr)]).await;
    let gated = step("s1", Action::IsolateHost, "edr", Some(Action::RestoreConnectivity));

    let report = engine.simulate_steps(&[&gated], &template()).await;
    assert_eq!(report.steps.len(), 1);
    assert!(edr.recorded_calls().iter().all(|call| call.mode == ExecutionMode::Simulation));
}

// ============================================================================
// SECTION: Aggregation
// ============================================================================

#[tokio::test]
async fn risk_aggregates_by_maximum_and_confidence_by_product() {
    let edr = Arc::new(ScriptedAdapter::new(
        "edr",
        [Action::CollectLogs, Action::IsolateHost],
    ));
    let engine = engine_with(vec![edr]).await;
    let read = step("s1", Action::CollectLogs, "edr", None);
    let write = step("s2", Action::IsolateHost, "edr", Some(Action::RestoreConnectivity));

    let report = engine.simulate_steps(&[&read, &write], &template()).await;
    assert_eq!(report.overall_risk_score, baseline_risk_score(Action::IsolateHost));
    assert_eq!(report.overall_risk_level, RiskLevel::Critical);
    let expected = report.steps[0].confidence * report.steps[1].confidence;
    assert!((report.overall_confidence - expected).abs() < 1e-9);
    assert_eq!(report.predicted_outcome, PredictedOutcome::Success);
}

#[tokio::test]
async fn failing_write_adapter_predicts_failure() {
    let edr = Arc::new(
        ScriptedAdapter::new("edr", [Action::IsolateHost]).with_outcome(
            Action::IsolateHost,
            ScriptedOutcome::Fail {
                code: ErrorCode::AdapterExecutionFailed,
                message: "containment api down".to_string(),
            },
        ),
    );
    let engine = engine_with(vec![edr]).await;
    let write = step("s1", Action::IsolateHost, "edr", Some(Action::RestoreConnectivity));

    let report = engine.simulate_steps(&[&write], &template()).await;
    assert_eq!(report.predicted_outcome, PredictedOutcome::Failure);
    assert!(!report.steps[0].validations_passed);
}

#[tokio::test]
async fn missing_adapter_on_a_read_step_degrades_to_partial() {
    let engine = engine_with(vec![]).await;
    let read = step("s1", Action::CollectLogs, "ghost", None);

    let report = engine.simulate_steps(&[&read], &template()).await;
    assert_eq!(report.predicted_outcome, PredictedOutcome::Partial);
}

// ============================================================================
// SECTION: Rollback Coverage
// ============================================================================

#[tokio::test]
async fn rollback_plan_requires_full_write_coverage() {
    let edr = Arc::new(ScriptedAdapter::new(
        "edr",
        [Action::IsolateHost, Action::BlockIp, Action::CollectLogs],
    ));
    let engine = engine_with(vec![edr]).await;
    let covered = step("s1", Action::IsolateHost, "edr", Some(Action::RestoreConnectivity));
    let uncovered = step("s2", Action::BlockIp, "edr", None);
    let read = step("s3", Action::CollectLogs, "edr", None);

    let report = engine.simulate_steps(&[&covered, &uncovered, &read], &template()).await;
    assert!(!report.rollback_plan.available);
    // Read steps are excluded from the denominator: 1 of 2 writes covered.
    assert!((report.rollback_plan.coverage_ratio - 0.5).abs() < 1e-9);
    assert_eq!(report.rollback_plan.uncovered_steps, vec![StepId::new("s2")]);

    let full = engine.simulate_steps(&[&covered, &read], &template()).await;
    assert!(full.rollback_plan.available);
    assert!((full.rollback_plan.coverage_ratio - 1.0).abs() < 1e-9);
}

// ============================================================================
// SECTION: Impact
// ============================================================================

#[tokio::test]
async fn impact_collects_assets_from_resolved_parameters() {
    let edr = Arc::new(ScriptedAdapter::new("edr", [Action::IsolateHost]));
    let engine = engine_with(vec![edr]).await;
    let mut target = step("s1", Action::IsolateHost, "edr", Some(Action::RestoreConnectivity));
    target.parameters.insert("user".to_string(), json!("j.doe"));

    let report = engine.simulate_steps(&[&target], &template()).await;
    let impact = &report.steps[0].impact;
    assert_eq!(impact.affected_hosts, vec!["ws-42".to_string()]);
    assert_eq!(impact.affected_users, vec!["j.doe".to_string()]);
    assert!(impact.reversible);
    assert!(report.affected_assets.contains(&"ws-42".to_string()));
}
