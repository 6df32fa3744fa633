// crates/responder-core/src/lib.rs
// ============================================================================
// Module: Responder Core Library
// Description: Data model, runtime helpers, and contracts for the Responder engine.
// Purpose: Provide the engine-independent foundation every other crate builds on.
// Dependencies: async-trait, bigdecimal, serde, serde_jcs, serde_json, sha2, thiserror,
// time, uuid
// ============================================================================

//! ## Overview
//! Responder Core defines the canonical model of a SOC runbook automation
//! engine with graduated autonomy: runbook documents and their validation,
//! execution contexts and lifecycle states, approvals, simulation reports,
//! the hash-chained audit model, template resolution, condition evaluation,
//! and the adapter/store contracts the engine dispatches through.
//! Invariants:
//! - Core types are pure data with stable serialized forms.
//! - The audit hash rule and approval freezing are byte-stable (canonical JSON).
//! - The action catalog is totally and disjointly partitioned into read/write.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::action::Action;
pub use crate::core::action::ActionKind;
pub use crate::core::alert::AlertEvent;
pub use crate::core::alert::Severity;
pub use crate::core::approval::ApprovalQueueEntry;
pub use crate::core::approval::ApprovalStatus;
pub use crate::core::audit::AuditEntry;
pub use crate::core::audit::AuditEventType;
pub use crate::core::audit::ChainVerification;
pub use crate::core::audit::verify_chain;
pub use crate::core::context::ContextError;
pub use crate::core::context::ExecutionContext;
pub use crate::core::context::ExecutionMode;
pub use crate::core::context::ExecutionState;
pub use crate::core::error::ErrorCode;
pub use crate::core::error::StepError;
pub use crate::core::error::classify_adapter_message;
pub use crate::core::error::sanitize_message;
pub use crate::core::hashing;
pub use crate::core::identifiers::AdapterName;
pub use crate::core::identifiers::ExecutionId;
pub use crate::core::identifiers::RequestId;
pub use crate::core::identifiers::RunbookId;
pub use crate::core::identifiers::SimulationId;
pub use crate::core::identifiers::StepId;
pub use crate::core::result::ExecutionMetrics;
pub use crate::core::result::ExecutionResult;
pub use crate::core::result::StepResult;
pub use crate::core::runbook::AutomationLevel;
pub use crate::core::runbook::DEFAULT_APPROVAL_TIMEOUT_SECS;
pub use crate::core::runbook::OnErrorPolicy;
pub use crate::core::runbook::RollbackDefinition;
pub use crate::core::runbook::Runbook;
pub use crate::core::runbook::RunbookConfig;
pub use crate::core::runbook::RunbookMetadata;
pub use crate::core::runbook::RunbookTriggers;
pub use crate::core::runbook::RunbookValidationError;
pub use crate::core::runbook::Step;
pub use crate::core::simulation::ImpactAssessment;
pub use crate::core::simulation::PredictedOutcome;
pub use crate::core::simulation::RiskLevel;
pub use crate::core::simulation::RollbackPlan;
pub use crate::core::simulation::SimulatedStep;
pub use crate::core::simulation::SimulationReport;
pub use crate::core::simulation::baseline_risk_score;
pub use crate::core::time::Timestamp;
pub use crate::interfaces::Adapter;
pub use crate::interfaces::AdapterCapabilities;
pub use crate::interfaces::AdapterConfig;
pub use crate::interfaces::AdapterError;
pub use crate::interfaces::AdapterFailure;
pub use crate::interfaces::AdapterResult;
pub use crate::interfaces::AdapterRow;
pub use crate::interfaces::AdapterStateStore;
pub use crate::interfaces::ApprovalError;
pub use crate::interfaces::ApprovalStore;
pub use crate::interfaces::AuditStore;
pub use crate::interfaces::ExecutionRecord;
pub use crate::interfaces::ExecutionStore;
pub use crate::interfaces::HealthReport;
pub use crate::interfaces::HealthState;
pub use crate::interfaces::MetricSample;
pub use crate::interfaces::MetricsStore;
pub use crate::interfaces::NewAuditEntry;
pub use crate::interfaces::ParameterValidation;
pub use crate::interfaces::RetryPolicy;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::failure_result;
pub use crate::interfaces::success_result;
pub use crate::interfaces::unsupported_rollback;
pub use crate::runtime::condition::evaluate_condition;
pub use crate::runtime::template::TemplateContext;
pub use crate::runtime::template::resolve_parameters;
pub use crate::runtime::template::resolve_value;
