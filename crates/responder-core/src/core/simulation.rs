// crates/responder-core/src/core/simulation.rs
// ============================================================================
// Module: Responder Simulation Model
// Description: Simulated step outcomes, impact assessments, and report aggregation.
// Purpose: Describe what a runbook would do without letting it do anything.
// Dependencies: serde, serde_json, crate::core
// ============================================================================

//! ## Overview
//! A simulation report is the artifact a human approves at L2: per-step
//! predictions with confidence and side effects, an impact assessment per
//! action, and run-level aggregates. Aggregation is conservative: risk is
//! the maximum step risk, confidence is the product of step confidences,
//! and the rollback plan is available only when every write step declares a
//! rollback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::action::Action;
use crate::core::identifiers::SimulationId;
use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Risk Level
// ============================================================================

/// Qualitative risk level derived from the 1-10 risk score.
///
/// # Invariants
/// - Variants are stable for serialization and approval display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Scores 1-3.
    Low,
    /// Scores 4-6.
    Medium,
    /// Scores 7-8.
    High,
    /// Scores 9-10.
    Critical,
}

impl RiskLevel {
    /// Maps a 1-10 risk score to its qualitative level.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            0 ..= 3 => Self::Low,
            4 ..= 6 => Self::Medium,
            7 | 8 => Self::High,
            _ => Self::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Predicted Outcome
// ============================================================================

/// Run-level predicted outcome.
///
/// # Invariants
/// - Variants are stable for serialization and approval display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PredictedOutcome {
    /// Every step passed validation in simulation.
    Success,
    /// Some steps failed validation but no write adapter errored.
    Partial,
    /// A write-action adapter errored in simulation.
    Failure,
}

// ============================================================================
// SECTION: Impact Assessment
// ============================================================================

/// Blast radius assessment for one simulated action.
///
/// # Invariants
/// - `risk_score` is in 1-10; `risk_level` is derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    /// Risk score in 1-10.
    pub risk_score: u8,
    /// Qualitative risk level.
    pub risk_level: RiskLevel,
    /// Whether the action is reversible via a declared rollback.
    pub reversible: bool,
    /// Hosts the action would touch.
    pub affected_hosts: Vec<String>,
    /// Users the action would touch.
    pub affected_users: Vec<String>,
    /// Services the action would touch.
    pub affected_services: Vec<String>,
}

// ============================================================================
// SECTION: Simulated Step
// ============================================================================

/// Predicted outcome for one step.
///
/// # Invariants
/// - `confidence` is in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedStep {
    /// Step identifier.
    pub step_id: StepId,
    /// Step name shown to approvers.
    pub step_name: String,
    /// Action simulated.
    pub action: Action,
    /// Predicted adapter result payload.
    pub predicted_result: Value,
    /// Confidence in the prediction, in [0, 1].
    pub confidence: f64,
    /// Whether parameter and adapter validations passed.
    pub validations_passed: bool,
    /// Human-readable side effects the action would have.
    pub side_effects: Vec<String>,
    /// Impact assessment for the action.
    pub impact: ImpactAssessment,
}

// ============================================================================
// SECTION: Rollback Plan
// ============================================================================

/// Rollback coverage summary for the simulated runbook.
///
/// # Invariants
/// - `available` is true iff every write step declares a rollback.
/// - `coverage_ratio` = steps-with-rollback / write-steps, clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    /// Whether a full rollback is available.
    pub available: bool,
    /// Fraction of write steps covered by a rollback definition.
    pub coverage_ratio: f64,
    /// Write steps lacking a rollback definition.
    pub uncovered_steps: Vec<StepId>,
}

// ============================================================================
// SECTION: Simulation Report
// ============================================================================

/// Run-level simulation report frozen into approval entries.
///
/// # Invariants
/// - `overall_risk_score` is the maximum step risk score.
/// - `overall_confidence` is the product of step confidences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Simulation identifier.
    pub simulation_id: SimulationId,
    /// Per-step predictions.
    pub steps: Vec<SimulatedStep>,
    /// Run-level predicted outcome.
    pub predicted_outcome: PredictedOutcome,
    /// Product of step confidences, in [0, 1].
    pub overall_confidence: f64,
    /// Maximum step risk score, in 1-10.
    pub overall_risk_score: u8,
    /// Qualitative level for `overall_risk_score`.
    pub overall_risk_level: RiskLevel,
    /// Distinct risks surfaced across steps.
    pub risks_identified: Vec<String>,
    /// Distinct assets (hosts, users, services) across steps.
    pub affected_assets: Vec<String>,
    /// Rollback coverage summary.
    pub rollback_plan: RollbackPlan,
}

impl SimulationReport {
    /// Aggregates per-step simulations into a report.
    ///
    /// `write_steps_without_rollback` lists write steps lacking a rollback
    /// definition; `write_step_count` is the total number of write steps.
    #[must_use]
    pub fn aggregate(
        steps: Vec<SimulatedStep>,
        write_adapter_errors: bool,
        write_steps_without_rollback: Vec<StepId>,
        write_step_count: usize,
    ) -> Self {
        let overall_risk_score = steps.iter().map(|step| step.impact.risk_score).max().unwrap_or(1);
        let overall_confidence =
            steps.iter().map(|step| step.confidence.clamp(0.0, 1.0)).product::<f64>();
        let predicted_outcome = if write_adapter_errors {
            PredictedOutcome::Failure
        } else if steps.iter().all(|step| step.validations_passed) {
            PredictedOutcome::Success
        } else {
            PredictedOutcome::Partial
        };
        let risks_identified: Vec<String> = steps
            .iter()
            .flat_map(|step| step.side_effects.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let affected_assets: Vec<String> = steps
            .iter()
            .flat_map(|step| {
                step.impact
                    .affected_hosts
                    .iter()
                    .chain(&step.impact.affected_users)
                    .chain(&step.impact.affected_services)
                    .cloned()
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let covered = write_step_count.saturating_sub(write_steps_without_rollback.len());
        let coverage_ratio = if write_step_count == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss, reason = "step counts are small")]
            let ratio = covered as f64 / write_step_count as f64;
            ratio.clamp(0.0, 1.0)
        };
        Self {
            simulation_id: SimulationId::generate(),
            steps,
            predicted_outcome,
            overall_confidence,
            overall_risk_score,
            overall_risk_level: RiskLevel::from_score(overall_risk_score),
            risks_identified,
            affected_assets,
            rollback_plan: RollbackPlan {
                available: write_steps_without_rollback.is_empty(),
                coverage_ratio,
                uncovered_steps: write_steps_without_rollback,
            },
        }
    }
}

// ============================================================================
// SECTION: Default Impact Table
// ============================================================================

/// Returns the baseline risk score for an action.
///
/// Read actions score 1-2; containment writes score by blast radius.
#[must_use]
pub const fn baseline_risk_score(action: Action) -> u8 {
    match action {
        Action::CollectLogs
        | Action::QuerySiem
        | Action::CollectFileMetadata
        | Action::EnrichIoc
        | Action::CheckReputation
        | Action::QueryThreatFeed
        | Action::RetrieveEdrData
        | Action::CalculateHash
        | Action::HttpRequest
        | Action::Wait => 1,
        Action::CollectNetworkTraffic | Action::SnapshotMemory => 2,
        Action::CreateTicket
        | Action::UpdateTicket
        | Action::CloseTicket
        | Action::NotifyEmail
        | Action::NotifySlack
        | Action::NotifyWebhook => 3,
        Action::StartEdrScan | Action::RestoreFile | Action::RestoreConnectivity => 4,
        Action::UnblockIp | Action::UnblockDomain | Action::EnableAccount => 5,
        Action::QuarantineFile | Action::KillProcess | Action::DeleteEmail => 6,
        Action::BlockIp | Action::BlockDomain | Action::RevokeSessions => 7,
        Action::ResetPassword => 8,
        Action::IsolateHost | Action::DisableAccount => 9,
    }
}
