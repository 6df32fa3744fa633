// crates/responder-engine/src/simulation.rs
// ============================================================================
// Module: Simulation Engine
// Description: Predicts runbook effects without producing real side effects.
// Purpose: Build the report a human approves before any L2 write executes.
// Dependencies: responder-adapters, responder-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! Simulation calls adapters in simulation mode, which must not mutate any
//! external system; read endpoints may be hit for enrichment. Each step
//! yields a predicted result, a confidence value, and an impact assessment
//! derived from the action's baseline risk and the assets named in its
//! resolved parameters. Aggregation is conservative (max risk, product
//! confidence) and the rollback plan is available only under full write-step
//! coverage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use responder_adapters::AdapterResolver;
use responder_core::ActionKind;
use responder_core::ExecutionMode;
use responder_core::ImpactAssessment;
use responder_core::RiskLevel;
use responder_core::SimulatedStep;
use responder_core::SimulationReport;
use responder_core::Step;
use responder_core::StepId;
use responder_core::TemplateContext;
use responder_core::baseline_risk_score;
use responder_core::resolve_parameters;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::time::timeout;
use tracing::debug;

// ============================================================================
// SECTION: Confidence Model
// ============================================================================

/// Confidence assigned to a validated read-action prediction.
const READ_CONFIDENCE: f64 = 0.95;
/// Confidence assigned to a validated write-action prediction.
const WRITE_CONFIDENCE: f64 = 0.85;
/// Confidence assigned when the adapter errors during simulation.
const ERROR_CONFIDENCE: f64 = 0.30;

// ============================================================================
// SECTION: Simulation Engine
// ============================================================================

/// Per-step simulation output plus bookkeeping the scheduler needs.
///
/// # Invariants
/// - `adapter_errored` is true only when the simulation call itself failed.
#[derive(Debug, Clone)]
pub struct StepSimulation {
    /// The simulated step record.
    pub step: SimulatedStep,
    /// Whether the adapter raised or returned a failure in simulation.
    pub adapter_errored: bool,
}

/// Simulation engine over registered adapters.
///
/// # Invariants
/// - Never invokes adapters in production mode.
#[derive(Clone)]
pub struct SimulationEngine {
    /// Adapter lookup capability.
    resolver: AdapterResolver,
}

impl SimulationEngine {
    /// Creates a simulation engine over the given resolver.
    #[must_use]
    pub const fn new(resolver: AdapterResolver) -> Self {
        Self {
            resolver,
        }
    }

    /// Simulates one step.
    pub async fn simulate_step(&self, step: &Step, template: &TemplateContext) -> StepSimulation {
        let resolved = resolve_parameters(&step.parameters, template);
        let (predicted, validations_passed, errored) = self.predict(step, &resolved).await;
        let confidence = if errored {
            ERROR_CONFIDENCE
        } else if matches!(step.action.kind(), ActionKind::Read) {
            READ_CONFIDENCE
        } else {
            WRITE_CONFIDENCE
        };
        let risk_score = baseline_risk_score(step.action);
        let impact = ImpactAssessment {
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            reversible: step.rollback.is_some(),
            affected_hosts: collect_params(&resolved, &["host", "hostname", "ip", "ip_address"]),
            affected_users: collect_params(&resolved, &["user", "username", "account"]),
            affected_services: collect_params(&resolved, &["service", "application"]),
        };
        debug!(step = step.id.as_str(), confidence, risk_score, "step simulated");
        StepSimulation {
            step: SimulatedStep {
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                action: step.action,
                predicted_result: predicted,
                confidence,
                validations_passed,
                side_effects: side_effects_for(step),
                impact,
            },
            adapter_errored: errored,
        }
    }

    /// Simulates a list of steps and aggregates the report.
    pub async fn simulate_steps(
        &self,
        steps: &[&Step],
        template: &TemplateContext,
    ) -> SimulationReport {
        let mut simulated = Vec::with_capacity(steps.len());
        let mut write_adapter_errors = false;
        for step in steps {
            let simulation = self.simulate_step(step, template).await;
            if simulation.adapter_errored && step.action.is_write() {
                write_adapter_errors = true;
            }
            simulated.push(simulation.step);
        }
        let write_steps: Vec<&&Step> =
            steps.iter().filter(|step| step.action.is_write()).collect();
        let uncovered: Vec<StepId> = write_steps
            .iter()
            .filter(|step| step.rollback.is_none())
            .map(|step| step.id.clone())
            .collect();
        SimulationReport::aggregate(simulated, write_adapter_errors, uncovered, write_steps.len())
    }

    /// Calls the adapter in simulation mode and shapes the prediction.
    async fn predict(
        &self,
        step: &Step,
        resolved: &Map<String, Value>,
    ) -> (Value, bool, bool) {
        let Some(adapter) = self.resolver.resolve(&step.executor) else {
            return (
                json!({"error": format!("no adapter registered under {}", step.executor)}),
                false,
                true,
            );
        };
        let validation = adapter.validate_parameters(step.action, resolved);
        if !validation.valid {
            return (json!({"validation_errors": validation.errors}), false, false);
        }
        if !adapter.capabilities().supports_simulation {
            return (
                json!({"predicted": true, "action": step.action.as_str(), "simulated": false}),
                true,
                false,
            );
        }
        let deadline = if step.timeout == 0 { 1 } else { step.timeout };
        let call = adapter.execute(step.action, resolved, ExecutionMode::Simulation);
        match timeout(Duration::from_secs(deadline), call).await {
            Err(_) => (json!({"error": "simulation timed out"}), false, true),
            Ok(Err(err)) => (json!({"error": err.to_string()}), false, true),
            Ok(Ok(result)) => {
                if result.success {
                    (result.output.unwrap_or(Value::Null), true, false)
                } else {
                    let message = result
                        .error
                        .map_or_else(|| "simulation failed".to_string(), |f| f.message);
                    (json!({"error": message}), false, true)
                }
            }
        }
    }
}

// ============================================================================
// SECTION: Impact Helpers
// ============================================================================

/// Collects string parameter values under any of the given keys.
fn collect_params(params: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    for key in keys {
        if let Some(value) = params.get(*key) {
            match value {
                Value::String(text) if !text.is_empty() => values.push(text.clone()),
                Value::Array(items) => {
                    values.extend(items.iter().filter_map(|item| {
                        item.as_str().map(std::string::ToString::to_string)
                    }));
                }
                _ => {}
            }
        }
    }
    values.sort();
    values.dedup();
    values
}

/// Describes the externally visible effects of one step.
fn side_effects_for(step: &Step) -> Vec<String> {
    match step.action.kind() {
        ActionKind::Read => Vec::new(),
        ActionKind::Write => {
            vec![format!("{} via adapter {}", step.action, step.executor)]
        }
    }
}
