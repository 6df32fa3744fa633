// crates/responder-core/src/core/runbook.rs
// ============================================================================
// Module: Responder Runbook Model
// Description: Authored runbook documents, steps, configuration, and validation.
// Purpose: Define the immutable automation recipe the scheduler executes.
// Dependencies: serde, thiserror, crate::core::{action, alert, identifiers}
// ============================================================================

//! ## Overview
//! A runbook is an authored, versioned artifact: metadata, trigger filters,
//! execution configuration, and an ordered list of steps forming a DAG via
//! `depends_on` edges. Runbooks are immutable once loaded; all structural
//! invariants (unique step identifiers, resolvable dependencies, no
//! self-edges, acyclicity) are enforced by [`Runbook::validate`] before any
//! execution is admitted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::action::Action;
use crate::core::alert::Severity;
use crate::core::identifiers::AdapterName;
use crate::core::identifiers::RunbookId;
use crate::core::identifiers::StepId;

// ============================================================================
// SECTION: Automation Level
// ============================================================================

/// Graduated autonomy level declared by a runbook.
///
/// # Invariants
/// - Variants are stable for serialization and gating decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AutomationLevel {
    /// Plan only: write actions are recorded, never executed.
    L0,
    /// Auto-execute read and low-impact actions without approval.
    L1,
    /// Write actions execute only after human approval of a simulation.
    L2,
}

// ============================================================================
// SECTION: Error Policy
// ============================================================================

/// Per-step failure policy.
///
/// # Invariants
/// - Variants are stable for serialization and continuation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnErrorPolicy {
    /// Stop the run on failure (triggers rollback when configured).
    #[default]
    Halt,
    /// Record the failure and continue with subsequent steps.
    Continue,
    /// Record the failure, mark the step skipped, and continue.
    Skip,
}

// ============================================================================
// SECTION: Rollback Definition
// ============================================================================

/// Inverse action attached to a step, replayed on terminal failure.
///
/// # Invariants
/// - `executor` defaults to the owning step's executor when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackDefinition {
    /// Inverse action to invoke.
    pub action: Action,
    /// Optional adapter override; defaults to the step executor.
    pub executor: Option<AdapterName>,
    /// Parameters for the inverse action (template expressions allowed).
    pub parameters: BTreeMap<String, Value>,
    /// Timeout in seconds for the rollback invocation.
    pub timeout: u64,
    /// Optional failure policy for the rollback itself.
    pub on_error: Option<OnErrorPolicy>,
}

// ============================================================================
// SECTION: Step
// ============================================================================

/// One node of a runbook's DAG.
///
/// # Invariants
/// - `id` is unique within the runbook.
/// - `depends_on` references sibling step identifiers only; no self-edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step identifier, unique within the runbook.
    pub id: StepId,
    /// Human-readable step name.
    pub name: String,
    /// Action symbol to execute.
    pub action: Action,
    /// Adapter name that must serve the action.
    pub executor: AdapterName,
    /// String-keyed parameters; values may contain template expressions.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Sibling step identifiers this step depends on.
    #[serde(default)]
    pub depends_on: BTreeSet<StepId>,
    /// Optional boolean guard evaluated after template substitution.
    #[serde(default)]
    pub condition: Option<String>,
    /// Timeout in seconds for the adapter invocation.
    pub timeout: u64,
    /// Failure policy for this step.
    #[serde(default)]
    pub on_error: OnErrorPolicy,
    /// Per-step approval override (forces the L2 gate at any level).
    #[serde(default)]
    pub approval_required: bool,
    /// Optional inverse action replayed during rollback.
    #[serde(default)]
    pub rollback: Option<RollbackDefinition>,
}

// ============================================================================
// SECTION: Triggers and Metadata
// ============================================================================

/// Detection filters selecting which alerts a runbook responds to.
///
/// # Invariants
/// - Empty lists match everything for that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunbookTriggers {
    /// Accepted detection sources.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Accepted MITRE ATT&CK technique identifiers.
    #[serde(default)]
    pub techniques: Vec<String>,
    /// Accepted platforms.
    #[serde(default)]
    pub platforms: Vec<String>,
    /// Accepted severities.
    #[serde(default)]
    pub severities: Vec<Severity>,
}

/// Authored runbook metadata.
///
/// # Invariants
/// - Free-form; never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunbookMetadata {
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Author-assigned tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// MITRE ATT&CK techniques this runbook remediates.
    #[serde(default)]
    pub mitre_techniques: Vec<String>,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default approval TTL in seconds when a runbook does not set one.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 3_600;

/// Execution configuration for a runbook.
///
/// # Invariants
/// - `max_execution_time` and `approval_timeout` are interpreted as seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunbookConfig {
    /// Declared autonomy level.
    pub automation_level: AutomationLevel,
    /// Run-level deadline in seconds.
    pub max_execution_time: u64,
    /// Forces the approval gate for every write step regardless of level.
    #[serde(default)]
    pub requires_approval: bool,
    /// Approval TTL in seconds.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout: u64,
    /// Whether independent steps may run concurrently.
    #[serde(default)]
    pub parallel_execution: bool,
    /// Whether completed steps roll back on terminal failure.
    #[serde(default)]
    pub rollback_on_failure: bool,
}

/// Returns the default approval TTL.
const fn default_approval_timeout() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}

// ============================================================================
// SECTION: Runbook
// ============================================================================

/// Authored runbook identified by `(id, version)`.
///
/// # Invariants
/// - Immutable once loaded; structural invariants checked by [`Self::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runbook {
    /// Runbook identifier.
    pub id: RunbookId,
    /// Runbook version string.
    pub version: String,
    /// Human-readable runbook name.
    pub name: String,
    /// Authored metadata.
    #[serde(default)]
    pub metadata: RunbookMetadata,
    /// Detection filters.
    #[serde(default)]
    pub triggers: RunbookTriggers,
    /// Execution configuration.
    pub config: RunbookConfig,
    /// Ordered step list forming a DAG via `depends_on`.
    pub steps: Vec<Step>,
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Structural validation errors for runbook documents.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunbookValidationError {
    /// Two steps share the same identifier.
    #[error("duplicate step id: {0}")]
    DuplicateStepId(StepId),
    /// A `depends_on` entry references a step that does not exist.
    #[error("step {step} depends on unknown step {dependency}")]
    UnknownDependency {
        /// Step carrying the bad edge.
        step: StepId,
        /// Referenced identifier that does not resolve.
        dependency: StepId,
    },
    /// A step depends on itself.
    #[error("step {0} depends on itself")]
    SelfDependency(StepId),
    /// The dependency graph contains a cycle.
    #[error("dependency cycle involving step {0}")]
    DependencyCycle(StepId),
}

impl Runbook {
    /// Validates the structural invariants of the step graph.
    ///
    /// # Errors
    ///
    /// Returns [`RunbookValidationError`] on duplicate identifiers, unresolved
    /// or self-referential dependencies, or cycles.
    pub fn validate(&self) -> Result<(), RunbookValidationError> {
        let mut seen: BTreeSet<&StepId> = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(&step.id) {
                return Err(RunbookValidationError::DuplicateStepId(step.id.clone()));
            }
        }
        for step in &self.steps {
            for dependency in &step.depends_on {
                if dependency == &step.id {
                    return Err(RunbookValidationError::SelfDependency(step.id.clone()));
                }
                if !seen.contains(dependency) {
                    return Err(RunbookValidationError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        self.check_acyclic()
    }

    /// Computes a topological order compatible with `depends_on`, stable in
    /// authored order among equal-rank steps.
    ///
    /// # Errors
    ///
    /// Returns [`RunbookValidationError::DependencyCycle`] when no order exists.
    pub fn execution_order(&self) -> Result<Vec<&Step>, RunbookValidationError> {
        let mut remaining: BTreeMap<&StepId, BTreeSet<&StepId>> = self
            .steps
            .iter()
            .map(|step| (&step.id, step.depends_on.iter().collect::<BTreeSet<_>>()))
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());
        let mut placed: BTreeSet<&StepId> = BTreeSet::new();
        while placed.len() < self.steps.len() {
            let mut advanced = false;
            for step in &self.steps {
                if placed.contains(&step.id) {
                    continue;
                }
                let ready = remaining
                    .get(&step.id)
                    .is_none_or(|deps| deps.iter().all(|dep| placed.contains(*dep)));
                if ready {
                    placed.insert(&step.id);
                    remaining.remove(&step.id);
                    order.push(step);
                    advanced = true;
                }
            }
            if !advanced {
                let stuck = self
                    .steps
                    .iter()
                    .find(|step| !placed.contains(&step.id))
                    .map_or_else(|| StepId::new("unknown"), |step| step.id.clone());
                return Err(RunbookValidationError::DependencyCycle(stuck));
            }
        }
        Ok(order)
    }

    /// Looks up a step by identifier.
    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| &step.id == id)
    }

    /// Checks the dependency graph for cycles.
    fn check_acyclic(&self) -> Result<(), RunbookValidationError> {
        self.execution_order().map(|_| ())
    }
}
