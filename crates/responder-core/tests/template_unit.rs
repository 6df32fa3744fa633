// crates/responder-core/tests/template_unit.rs
// ============================================================================
// Module: Template Resolver Unit Tests
// Description: Targeted tests for `{{ namespace.path }}` resolution.
// Purpose: Validate typed pass-through, empty substitution, purity, and
//          namespace routing.
// ============================================================================

//! ## Overview
//! Unit-level tests for the template resolver:
//! - Whole-value expressions preserve the resolved JSON type
//! - Missing paths substitute empty inside larger strings
//! - All four namespaces route correctly (alert, steps, context, env)
//! - Resolution never mutates the context

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use responder_core::AlertEvent;
use responder_core::ExecutionContext;
use responder_core::ExecutionMode;
use responder_core::RunbookId;
use responder_core::Severity;
use responder_core::StepId;
use responder_core::TemplateContext;
use responder_core::Timestamp;
use responder_core::resolve_parameters;
use responder_core::resolve_value;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn sample_alert() -> AlertEvent {
    AlertEvent {
        alert_id: "alert-7".to_string(),
        title: "Suspicious beacon".to_string(),
        severity: Severity::High,
        source: "edr".to_string(),
        techniques: vec!["T1071".to_string()],
        platform: Some("windows".to_string()),
        observed_at: Timestamp::parse("2026-03-01T08:00:00.000Z").expect("timestamp"),
        data: json!({"host": {"hostname": "ws-42", "ip": "10.1.2.3"}}),
    }
}

fn sample_context() -> ExecutionContext {
    let mut ctx = ExecutionContext::new(
        RunbookId::new("rb-contain-host"),
        "1.2.0",
        ExecutionMode::Production,
        Some(sample_alert()),
    );
    ctx.set_step_output(&StepId::new("step-01"), json!({"score": 92, "verdict": "malicious"}));
    ctx
}

// ============================================================================
// SECTION: Whole-Value Expressions
// ============================================================================

#[test]
fn whole_value_expression_preserves_number_type() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let resolved = resolve_value(&json!("{{steps.step-01.output.score}}"), &template);
    assert_eq!(resolved, json!(92));
}

#[test]
fn whole_value_expression_with_missing_path_returns_null() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let resolved = resolve_value(&json!("{{steps.step-99.output.score}}"), &template);
    assert_eq!(resolved, Value::Null);
}

#[test]
fn step_parameters_resolve_like_the_runbook_authors_wrote_them() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let mut parameters = BTreeMap::new();
    parameters.insert("host".to_string(), json!("{{alert.host.hostname}}"));
    parameters.insert("threshold".to_string(), json!("{{steps.step-01.output.score}}"));
    let resolved = resolve_parameters(&parameters, &template);
    assert_eq!(resolved.get("host"), Some(&json!("ws-42")));
    assert_eq!(resolved.get("threshold"), Some(&json!(92)));
}

// ============================================================================
// SECTION: In-String Substitution
// ============================================================================

#[test]
fn missing_path_substitutes_empty_inside_larger_string() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let resolved =
        resolve_value(&json!("host={{alert.host.nope}} done"), &template);
    assert_eq!(resolved, json!("host= done"));
}

#[test]
fn multiple_expressions_interpolate_in_order() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let resolved = resolve_value(
        &json!("{{alert.host.hostname}} scored {{steps.step-01.output.score}}"),
        &template,
    );
    assert_eq!(resolved, json!("ws-42 scored 92"));
}

#[test]
fn unterminated_expression_passes_through_verbatim() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let resolved = resolve_value(&json!("broken {{alert.title"), &template);
    assert_eq!(resolved, json!("broken {{alert.title"));
}

// ============================================================================
// SECTION: Namespaces
// ============================================================================

#[test]
fn context_namespace_exposes_execution_fields() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let mode = resolve_value(&json!("{{context.mode}}"), &template);
    assert_eq!(mode, json!("production"));
    let execution_id = resolve_value(&json!("{{context.execution_id}}"), &template);
    assert_eq!(execution_id, json!(ctx.execution_id.to_string()));
}

#[test]
fn env_namespace_prefers_overrides() {
    let ctx = sample_context();
    let mut overrides = BTreeMap::new();
    overrides.insert("SOC_REGION".to_string(), "emea".to_string());
    let template = TemplateContext::from_execution(&ctx).with_env_overrides(overrides);
    let resolved = resolve_value(&json!("{{env.SOC_REGION}}"), &template);
    assert_eq!(resolved, json!("emea"));
    let missing = resolve_value(&json!("{{env.SOC_MISSING}}"), &template);
    assert_eq!(missing, Value::Null);
}

#[test]
fn unknown_namespace_resolves_to_null() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    assert_eq!(resolve_value(&json!("{{secrets.token}}"), &template), Value::Null);
}

// ============================================================================
// SECTION: Recursion and Purity
// ============================================================================

#[test]
fn resolution_recurses_through_objects_and_arrays() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let nested = json!({
        "targets": ["{{alert.host.hostname}}", "{{alert.host.ip}}"],
        "meta": {"severity": "{{alert.severity}}", "count": 3},
    });
    let resolved = resolve_value(&nested, &template);
    assert_eq!(
        resolved,
        json!({
            "targets": ["ws-42", "10.1.2.3"],
            "meta": {"severity": "high", "count": 3},
        })
    );
}

#[test]
fn resolution_is_deterministic_for_a_fixed_context() {
    let ctx = sample_context();
    let template = TemplateContext::from_execution(&ctx);
    let input = json!("{{alert.host.hostname}}/{{steps.step-01.output.verdict}}");
    let first = resolve_value(&input, &template);
    let second = resolve_value(&input, &template);
    assert_eq!(first, second);
    assert_eq!(first, json!("ws-42/malicious"));
}

#[test]
fn get_variable_is_pure() {
    let ctx = sample_context();
    let first = ctx.get_variable("steps.step-01.output.score").cloned();
    let second = ctx.get_variable("steps.step-01.output.score").cloned();
    assert_eq!(first, second);
    assert_eq!(first, Some(json!(92)));
}
