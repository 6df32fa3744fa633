// crates/responder-core/src/interfaces/mod.rs
// ============================================================================
// Module: Responder Interfaces
// Description: Backend-agnostic contracts for adapters and persistence.
// Purpose: Define the seams between the engine, vendor tools, and storage.
// Dependencies: async-trait, serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the engine talks to external systems without
//! embedding backend detail. The adapter contract is the stable boundary
//! toward vendor integrations (EDR, SIEM, firewall, IAM, ticketing); the
//! store traits are the boundary toward persistence. Implementations must
//! fail closed on missing or invalid data, and adapters must be safe for
//! concurrent `execute` calls up to their declared concurrency limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::action::Action;
use crate::core::approval::ApprovalQueueEntry;
use crate::core::approval::ApprovalStatus;
use crate::core::audit::AuditEntry;
use crate::core::audit::AuditEventType;
use crate::core::context::ExecutionContext;
use crate::core::context::ExecutionMode;
use crate::core::context::ExecutionState;
use crate::core::error::ErrorCode;
use crate::core::identifiers::AdapterName;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::RunbookId;
use crate::core::identifiers::StepId;
use crate::core::result::ExecutionResult;
use crate::core::result::StepResult;
use crate::core::runbook::Runbook;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Adapter Configuration
// ============================================================================

/// Retry policy applied by the step executor around one adapter call.
///
/// # Invariants
/// - `max_attempts >= 1`; retries apply only to retryable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts including the first.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub backoff_ms: u64,
    /// Doubles the delay per attempt when true; constant otherwise.
    pub exponential: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
            exponential: false,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before the given zero-based retry attempt.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        if self.exponential {
            let shift = u64::from(attempt).min(63);
            self.backoff_ms.saturating_mul(1_u64 << shift)
        } else {
            self.backoff_ms
        }
    }
}

/// Configuration handed to an adapter at registration.
///
/// # Invariants
/// - `settings` is adapter-defined and opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdapterConfig {
    /// Adapter-defined settings (endpoints, credentials references, limits).
    #[serde(default)]
    pub settings: Map<String, Value>,
    /// Retry policy for this adapter's calls.
    #[serde(default)]
    pub retry: RetryPolicy,
}

// ============================================================================
// SECTION: Adapter Results
// ============================================================================

/// Failure payload carried inside a returned adapter result.
///
/// # Invariants
/// - `retryable` is consistent with `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFailure {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable failure message.
    pub message: String,
    /// Adapter that produced the failure.
    pub adapter: AdapterName,
    /// Action that failed.
    pub action: Action,
    /// Whether the failure is retryable.
    pub retryable: bool,
}

/// Uniform result of one adapter invocation.
///
/// # Invariants
/// - `success` implies `error` is absent; failure implies `output` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResult {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Action invoked.
    pub action: Action,
    /// Adapter that served the invocation.
    pub executor: AdapterName,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Output payload on success.
    pub output: Option<Value>,
    /// Failure payload on failure.
    pub error: Option<AdapterFailure>,
    /// Optional adapter-defined metadata.
    pub metadata: Option<Map<String, Value>>,
}

/// Builds a successful adapter result.
#[must_use]
pub fn success_result(
    action: Action,
    executor: AdapterName,
    duration_ms: u64,
    output: Value,
) -> AdapterResult {
    AdapterResult {
        success: true,
        action,
        executor,
        duration_ms,
        output: Some(output),
        error: None,
        metadata: None,
    }
}

/// Builds a failed adapter result.
#[must_use]
pub fn failure_result(
    action: Action,
    executor: AdapterName,
    duration_ms: u64,
    code: ErrorCode,
    message: impl Into<String>,
) -> AdapterResult {
    let failure = AdapterFailure {
        code,
        message: message.into(),
        adapter: executor.clone(),
        action,
        retryable: code.is_retryable(),
    };
    AdapterResult {
        success: false,
        action,
        executor,
        duration_ms,
        output: None,
        error: Some(failure),
        metadata: None,
    }
}

/// Builds the standard rollback-unsupported failure result.
#[must_use]
pub fn unsupported_rollback(adapter: AdapterName, action: Action) -> AdapterResult {
    let message = format!("adapter {adapter} does not support rollback of {action}");
    failure_result(action, adapter, 0, ErrorCode::RollbackNotSupported, message)
}

// ============================================================================
// SECTION: Adapter Health and Capabilities
// ============================================================================

/// Health state reported by an adapter.
///
/// # Invariants
/// - Variants are stable for serialization and persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Backend reachable and responsive.
    Healthy,
    /// Backend reachable with degraded behavior.
    Degraded,
    /// Backend unreachable or failing.
    Unhealthy,
    /// Health has not been determined.
    Unknown,
}

impl HealthState {
    /// Returns the stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

/// Health check report.
///
/// # Invariants
/// - `checked_at` is the wall-clock time of the probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Probe outcome.
    pub status: HealthState,
    /// Optional operator-facing message.
    pub message: Option<String>,
    /// Probe latency in milliseconds, when measured.
    pub latency_ms: Option<u64>,
    /// Probe time.
    pub checked_at: Timestamp,
}

impl HealthReport {
    /// Builds an `Unknown` report stamped now.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            status: HealthState::Unknown,
            message: None,
            latency_ms: None,
            checked_at: Timestamp::now(),
        }
    }
}

/// Capability declaration for one adapter.
///
/// # Invariants
/// - `max_concurrency` of zero means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCapabilities {
    /// Actions the adapter serves.
    pub supported_actions: BTreeSet<Action>,
    /// Whether the adapter honors simulation mode without side effects.
    pub supports_simulation: bool,
    /// Whether the adapter implements rollback.
    pub supports_rollback: bool,
    /// Whether the adapter implements parameter validation.
    pub supports_validation: bool,
    /// Maximum concurrent `execute` calls (0 = unlimited).
    pub max_concurrency: usize,
}

/// Pre-flight parameter validation outcome.
///
/// # Invariants
/// - `valid` implies `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValidation {
    /// Whether the parameters are acceptable.
    pub valid: bool,
    /// Validation error messages when invalid.
    pub errors: Vec<String>,
}

impl ParameterValidation {
    /// Builds a passing validation.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Builds a failing validation from messages.
    #[must_use]
    pub const fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

// ============================================================================
// SECTION: Adapter Contract
// ============================================================================

/// Adapter contract errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Adapter does not serve the requested action.
    #[error("adapter {adapter} does not support action {action}")]
    UnsupportedAction {
        /// Adapter name.
        adapter: AdapterName,
        /// Unsupported action.
        action: Action,
    },
    /// Adapter initialization failed or was repeated without shutdown.
    #[error("adapter initialization failed: {0}")]
    Initialization(String),
    /// Adapter invocation raised an error (classified by the step executor).
    #[error("adapter invocation failed: {0}")]
    Invocation(String),
}

/// Uniform wrapper over one external security tool.
///
/// Implementations must be `Send + Sync` and safe for concurrent `execute`
/// calls up to [`AdapterCapabilities::max_concurrency`]. In simulation mode
/// `execute` must not produce external side effects.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Stable adapter name used by step `executor` fields.
    fn name(&self) -> &str;

    /// Adapter implementation version.
    fn version(&self) -> &str;

    /// Actions this adapter serves.
    fn supported_actions(&self) -> BTreeSet<Action>;

    /// One-shot initialization; idempotent only after `shutdown`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when initialization fails.
    async fn initialize(&self, config: &AdapterConfig) -> Result<(), AdapterError>;

    /// Executes one action in the given mode.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the invocation itself fails; expected
    /// backend failures are reported inside the returned result instead.
    async fn execute(
        &self,
        action: Action,
        params: &Map<String, Value>,
        mode: ExecutionMode,
    ) -> Result<AdapterResult, AdapterError>;

    /// Invokes the inverse of a previously executed action.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the invocation itself fails.
    async fn rollback(
        &self,
        action: Action,
        params: &Map<String, Value>,
    ) -> Result<AdapterResult, AdapterError> {
        let _ = params;
        Ok(unsupported_rollback(AdapterName::new(self.name()), action))
    }

    /// Probes backend health.
    async fn health_check(&self) -> HealthReport {
        HealthReport::unknown()
    }

    /// Declares adapter capabilities; conservative defaults.
    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_actions: self.supported_actions(),
            supports_simulation: false,
            supports_rollback: false,
            supports_validation: false,
            max_concurrency: 0,
        }
    }

    /// Pre-flight parameter validation; accepts everything by default.
    fn validate_parameters(&self, action: Action, params: &Map<String, Value>) -> ParameterValidation {
        let _ = (action, params);
        ParameterValidation::ok()
    }

    /// Releases adapter resources; `initialize` may be called again after.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when teardown fails.
    async fn shutdown(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Persistence errors shared by all store traits.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages avoid embedding raw payloads.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("store db error: {0}")]
    Db(String),
    /// Stored data failed integrity verification.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Stored data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Requested row does not exist.
    #[error("store row not found: {0}")]
    NotFound(String),
}

/// Approval transition errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No entry exists for the request identifier.
    #[error("approval request not found: {0}")]
    NotFound(RequestId),
    /// Entry is already terminal.
    #[error("approval request {request_id} is not pending (status {status})")]
    NotPending {
        /// Request identifier.
        request_id: RequestId,
        /// Current terminal status.
        status: ApprovalStatus,
    },
    /// Entry passed its TTL; it has been transitioned to `expired`.
    #[error("approval request expired: {0}")]
    Expired(RequestId),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Execution Store
// ============================================================================

/// Persisted execution header row.
///
/// # Invariants
/// - `state` mirrors the scheduler's last persisted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: RunbookId,
    /// Runbook version string.
    pub runbook_version: String,
    /// Runbook name.
    pub runbook_name: String,
    /// Last persisted state.
    pub state: ExecutionState,
    /// Side-effect mode.
    pub mode: ExecutionMode,
    /// Terminal error message, when failed.
    pub error: Option<String>,
    /// Run start time.
    pub started_at: Timestamp,
    /// Run completion time, when terminal.
    pub completed_at: Option<Timestamp>,
    /// Wall-clock duration in milliseconds, when terminal.
    pub duration_ms: Option<u64>,
}

/// Store for execution headers, snapshots, and step results.
pub trait ExecutionStore: Send + Sync {
    /// Inserts the header row for a new execution, freezing the runbook
    /// document that will drive it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn create_execution(
        &self,
        context: &ExecutionContext,
        runbook: &Runbook,
    ) -> Result<(), StoreError>;

    /// Loads the frozen runbook document for an execution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read or parse fails.
    fn load_runbook(&self, execution_id: ExecutionId) -> Result<Option<Runbook>, StoreError>;

    /// Updates the persisted state and optional error for an execution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update_execution_state(
        &self,
        execution_id: ExecutionId,
        state: ExecutionState,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Persists a context snapshot with an integrity hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when serialization or the write fails.
    fn save_context_snapshot(
        &self,
        execution_id: ExecutionId,
        snapshot: &Value,
    ) -> Result<(), StoreError>;

    /// Loads a context snapshot, verifying its integrity hash (fail closed).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] on hash mismatch.
    fn load_context_snapshot(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Value>, StoreError>;

    /// Writes the terminal result for an execution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn finalize_execution(&self, result: &ExecutionResult) -> Result<(), StoreError>;

    /// Appends one step result row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_step_result(
        &self,
        execution_id: ExecutionId,
        result: &StepResult,
    ) -> Result<(), StoreError>;

    /// Marks a persisted step result as rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn mark_step_rolled_back(
        &self,
        execution_id: ExecutionId,
        step_id: &StepId,
    ) -> Result<(), StoreError>;

    /// Loads one execution header.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionRecord>, StoreError>;

    /// Lists recent executions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>, StoreError>;

    /// Lists step results for an execution in attempt order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_step_results(&self, execution_id: ExecutionId) -> Result<Vec<StepResult>, StoreError>;
}

// ============================================================================
// SECTION: Approval Store
// ============================================================================

/// Store for approval queue entries.
///
/// Status transitions must be serialized by a `status = 'pending'` guard so
/// two concurrent approvers cannot both win.
pub trait ApprovalStore: Send + Sync {
    /// Inserts a new pending entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn insert_approval(&self, entry: &ApprovalQueueEntry) -> Result<(), StoreError>;

    /// Atomically transitions `pending -> approved`.
    ///
    /// When `now` is at or past the entry's expiry the entry is transitioned
    /// to `expired` instead and [`ApprovalError::Expired`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the entry is missing, terminal, or expired.
    fn approve(
        &self,
        request_id: RequestId,
        approver: &str,
        now: Timestamp,
    ) -> Result<ApprovalQueueEntry, ApprovalError>;

    /// Atomically transitions `pending -> denied`.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the entry is missing or terminal.
    fn deny(
        &self,
        request_id: RequestId,
        reason: &str,
        now: Timestamp,
    ) -> Result<ApprovalQueueEntry, ApprovalError>;

    /// Bulk-expires every pending entry past its TTL; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn expire_stale(&self, now: Timestamp) -> Result<u64, StoreError>;

    /// Loads one entry by request identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_approval(&self, request_id: RequestId)
    -> Result<Option<ApprovalQueueEntry>, StoreError>;

    /// Lists entries with the given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_by_status(
        &self,
        status: ApprovalStatus,
        limit: usize,
    ) -> Result<Vec<ApprovalQueueEntry>, StoreError>;
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Unchained audit entry handed to the store for appending.
///
/// # Invariants
/// - `details_json` is canonical JSON; the store hashes these exact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    /// Entry timestamp.
    pub timestamp: Timestamp,
    /// Execution this entry belongs to.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: RunbookId,
    /// Event type.
    pub event_type: AuditEventType,
    /// Acting identity.
    pub actor: String,
    /// Canonical JSON details.
    pub details_json: String,
    /// Derived success flag.
    pub success: bool,
}

/// Append-only store for the hash-chained audit journal.
///
/// The previous-hash lookup and the insert must happen inside one
/// transaction so concurrent writers cannot interleave a chain.
pub trait AuditStore: Send + Sync {
    /// Appends one entry, computing its chain hash transactionally.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// Returns an execution's entries in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn get_execution_log(&self, execution_id: ExecutionId) -> Result<Vec<AuditEntry>, StoreError>;
}

// ============================================================================
// SECTION: Metrics Store
// ============================================================================

/// One aggregated metric sample.
///
/// # Invariants
/// - `(period_start, period_end, name, dimensions)` is unique; re-recording
///   replaces the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Aggregation period start.
    pub period_start: Timestamp,
    /// Aggregation period end.
    pub period_end: Timestamp,
    /// Metric name.
    pub name: String,
    /// Metric value.
    pub value: f64,
    /// Dimension labels.
    pub dimensions: BTreeMap<String, String>,
}

/// Store for aggregated engine metrics.
pub trait MetricsStore: Send + Sync {
    /// Upserts one metric sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn record_metric(&self, sample: &MetricSample) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Adapter State Store
// ============================================================================

/// Persisted adapter registration row.
///
/// # Invariants
/// - `name` is unique; re-registration replaces the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRow {
    /// Adapter name.
    pub name: AdapterName,
    /// Adapter type label (implementation family).
    pub adapter_type: String,
    /// Whether the adapter is enabled for dispatch.
    pub enabled: bool,
    /// Registration configuration as JSON.
    pub config_json: String,
    /// Last observed health state, when probed.
    pub health_status: Option<HealthState>,
    /// Last health probe time, when probed.
    pub last_health_check: Option<Timestamp>,
}

/// Store for adapter registration and health rows.
pub trait AdapterStateStore: Send + Sync {
    /// Upserts one adapter row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert_adapter(&self, row: &AdapterRow) -> Result<(), StoreError>;

    /// Records a health probe outcome for an adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn record_adapter_health(
        &self,
        name: &AdapterName,
        status: HealthState,
        checked_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Lists all adapter rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list_adapters(&self) -> Result<Vec<AdapterRow>, StoreError>;
}
