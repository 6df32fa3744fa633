// crates/responder-engine/src/queue.rs
// ============================================================================
// Module: Approval Queue and Queue Executor
// Description: Human gate lifecycle and production execution of approved actions.
// Purpose: Freeze what gets approved, then execute exactly those bytes.
// Dependencies: responder-adapters, responder-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The approval queue freezes the resolved parameters and the simulation
//! report as canonical JSON at enqueue time; approval means "approve exactly
//! this payload". The queue executor bridges approved entries to production:
//! it parses the frozen bytes, invokes the adapter once, audits the outcome,
//! and re-enters the scheduler to resume the parked run. Normal failure
//! paths return result records; only infrastructure failures surface as
//! errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use responder_adapters::AdapterResolver;
use responder_core::Action;
use responder_core::AdapterResult;
use responder_core::ApprovalError;
use responder_core::ApprovalQueueEntry;
use responder_core::ApprovalStatus;
use responder_core::ApprovalStore;
use responder_core::AuditEventType;
use responder_core::ErrorCode;
use responder_core::ExecutionId;
use responder_core::ExecutionMode;
use responder_core::RequestId;
use responder_core::RunbookId;
use responder_core::SimulationReport;
use responder_core::Step;
use responder_core::StepError;
use responder_core::StoreError;
use responder_core::Timestamp;
use responder_core::classify_adapter_message;
use responder_core::failure_result;
use responder_core::hashing::canonical_json_bytes;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracing::info;
use tracing::warn;

use crate::audit::AuditLogger;
use crate::error::EngineError;
use crate::scheduler::RunbookScheduler;
use crate::scheduler::SchedulerOutcome;

// ============================================================================
// SECTION: Approval Queue
// ============================================================================

/// Request to enqueue one human gate.
///
/// # Invariants
/// - `resolved_parameters` are fully template-resolved before freezing.
#[derive(Debug)]
pub struct ApprovalRequest<'a> {
    /// Execution awaiting the approval.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: &'a RunbookId,
    /// Runbook name shown to approvers.
    pub runbook_name: &'a str,
    /// Gated step.
    pub step: &'a Step,
    /// Fully resolved parameters to freeze.
    pub resolved_parameters: &'a Map<String, Value>,
    /// Simulation report to freeze.
    pub simulation: &'a SimulationReport,
    /// TTL in seconds.
    pub ttl_seconds: u64,
}

/// Approval queue service over the approval store.
///
/// # Invariants
/// - Frozen payloads are canonical JSON written once and never re-serialized.
#[derive(Clone)]
pub struct ApprovalQueue {
    /// Underlying approval store.
    store: Arc<dyn ApprovalStore>,
    /// Audit logger.
    audit: AuditLogger,
}

impl ApprovalQueue {
    /// Creates a queue service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ApprovalStore>, audit: AuditLogger) -> Self {
        Self {
            store,
            audit,
        }
    }

    /// Enqueues a pending entry with frozen payloads.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when freezing or the insert fails.
    pub fn create(&self, request: &ApprovalRequest<'_>) -> Result<ApprovalQueueEntry, EngineError> {
        let requested_at = Timestamp::now();
        let parameters_json = freeze(request.resolved_parameters)?;
        let simulation_json = freeze(request.simulation)?;
        let entry = ApprovalQueueEntry {
            request_id: RequestId::generate(),
            execution_id: request.execution_id,
            runbook_id: request.runbook_id.clone(),
            runbook_name: request.runbook_name.to_string(),
            step_id: request.step.id.clone(),
            step_name: request.step.name.clone(),
            action: request.step.action,
            executor: request.step.executor.clone(),
            parameters_json,
            simulation_json,
            status: ApprovalStatus::Pending,
            requested_at,
            expires_at: requested_at.plus_seconds(request.ttl_seconds),
            approved_by: None,
            approved_at: None,
            denial_reason: None,
        };
        self.store.insert_approval(&entry)?;
        self.audit.record(
            entry.execution_id,
            &entry.runbook_id,
            AuditEventType::ApprovalQueueCreated,
            &json!({
                "request_id": entry.request_id.to_string(),
                "step_id": entry.step_id.as_str(),
                "action": entry.action.as_str(),
                "expires_at": entry.expires_at.to_rfc3339(),
            }),
        )?;
        info!(request_id = %entry.request_id, step = entry.step_id.as_str(), "approval enqueued");
        Ok(entry)
    }

    /// Approves a pending entry; lazily expires entries past their TTL.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the entry is missing, terminal, or
    /// expired.
    pub fn approve(
        &self,
        request_id: RequestId,
        approver: &str,
    ) -> Result<ApprovalQueueEntry, ApprovalError> {
        match self.store.approve(request_id, approver, Timestamp::now()) {
            Ok(entry) => {
                let _ = self.audit.record_as(
                    entry.execution_id,
                    &entry.runbook_id,
                    AuditEventType::ApprovalGranted,
                    approver,
                    &json!({
                        "request_id": request_id.to_string(),
                        "step_id": entry.step_id.as_str(),
                    }),
                );
                Ok(entry)
            }
            Err(ApprovalError::Expired(id)) => {
                self.audit_expiry(id);
                Err(ApprovalError::Expired(id))
            }
            Err(other) => Err(other),
        }
    }

    /// Denies a pending entry with a reason.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the entry is missing or terminal.
    pub fn deny(
        &self,
        request_id: RequestId,
        reason: &str,
    ) -> Result<ApprovalQueueEntry, ApprovalError> {
        let entry = self.store.deny(request_id, reason, Timestamp::now())?;
        let _ = self.audit.record(
            entry.execution_id,
            &entry.runbook_id,
            AuditEventType::ApprovalDenied,
            &json!({
                "request_id": request_id.to_string(),
                "step_id": entry.step_id.as_str(),
                "reason": reason,
            }),
        );
        Ok(entry)
    }

    /// Bulk-expires every pending entry past its TTL; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    pub fn expire_stale(&self) -> Result<u64, StoreError> {
        let now = Timestamp::now();
        let stale: Vec<ApprovalQueueEntry> = self
            .store
            .list_by_status(ApprovalStatus::Pending, usize::MAX)?
            .into_iter()
            .filter(|entry| entry.is_expired_at(&now))
            .collect();
        let expired = self.store.expire_stale(now)?;
        for entry in stale {
            let _ = self.audit.record(
                entry.execution_id,
                &entry.runbook_id,
                AuditEventType::ApprovalExpired,
                &json!({
                    "request_id": entry.request_id.to_string(),
                    "step_id": entry.step_id.as_str(),
                }),
            );
        }
        Ok(expired)
    }

    /// Lists pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn list_pending(&self, limit: usize) -> Result<Vec<ApprovalQueueEntry>, StoreError> {
        self.store.list_by_status(ApprovalStatus::Pending, limit)
    }

    /// Loads one entry by request identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn get_by_id(
        &self,
        request_id: RequestId,
    ) -> Result<Option<ApprovalQueueEntry>, StoreError> {
        self.store.get_approval(request_id)
    }

    /// Audits the lazy expiry performed inside `approve`.
    fn audit_expiry(&self, request_id: RequestId) {
        if let Ok(Some(entry)) = self.store.get_approval(request_id) {
            let _ = self.audit.record(
                entry.execution_id,
                &entry.runbook_id,
                AuditEventType::ApprovalExpired,
                &json!({
                    "request_id": request_id.to_string(),
                    "step_id": entry.step_id.as_str(),
                }),
            );
        }
    }
}

/// Freezes a value to a canonical JSON string.
fn freeze<T: serde::Serialize>(value: &T) -> Result<String, EngineError> {
    let bytes = canonical_json_bytes(value)?;
    String::from_utf8(bytes).map_err(|err| {
        EngineError::Store(StoreError::Invalid(format!("frozen payload not utf-8: {err}")))
    })
}

// ============================================================================
// SECTION: Queue Executor
// ============================================================================

/// Result of executing one approved entry.
///
/// # Invariants
/// - `success` reflects the production adapter invocation, not the resumed
///   run outcome.
#[derive(Debug, Clone)]
pub struct ApprovalExecution {
    /// Approval request identifier.
    pub request_id: RequestId,
    /// Execution the entry belonged to.
    pub execution_id: ExecutionId,
    /// Executed action.
    pub action: Action,
    /// Whether the production invocation succeeded.
    pub success: bool,
    /// Adapter output on success.
    pub output: Option<Value>,
    /// Failure details otherwise.
    pub error: Option<StepError>,
    /// Execution time.
    pub executed_at: Timestamp,
    /// Approver identity.
    pub executed_by: String,
    /// Outcome of resuming the parked run, when resumption ran.
    pub run_outcome: Option<SchedulerOutcome>,
}

/// Bridges approved entries to production execution and run resumption.
///
/// # Invariants
/// - Frozen parameters are parsed byte-identically; no re-templating occurs.
#[derive(Clone)]
pub struct QueueExecutor {
    /// Queue service.
    queue: ApprovalQueue,
    /// Adapter lookup capability.
    resolver: AdapterResolver,
    /// Audit logger.
    audit: AuditLogger,
    /// Scheduler re-entered to resume parked runs.
    scheduler: Arc<RunbookScheduler>,
}

impl QueueExecutor {
    /// Creates a queue executor.
    #[must_use]
    pub fn new(
        queue: ApprovalQueue,
        resolver: AdapterResolver,
        audit: AuditLogger,
        scheduler: Arc<RunbookScheduler>,
    ) -> Self {
        Self {
            queue,
            resolver,
            audit,
            scheduler,
        }
    }

    /// Approves an entry and executes its frozen action in production.
    ///
    /// Normal failures (expired, denied elsewhere, adapter failure) are
    /// carried in the returned record; only infrastructure failures error.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on store failures or unknown request ids.
    pub async fn approve_and_execute(
        &self,
        request_id: RequestId,
        approver: &str,
    ) -> Result<ApprovalExecution, EngineError> {
        let entry = match self.queue.approve(request_id, approver) {
            Ok(entry) => entry,
            Err(ApprovalError::Expired(id)) => {
                return self.expired_record(id, approver).await;
            }
            Err(ApprovalError::NotPending {
                request_id: id,
                status,
            }) => {
                return self.not_pending_record(id, approver, status);
            }
            Err(other) => return Err(EngineError::Approval(other)),
        };

        let adapter_result = self.execute_frozen(&entry).await;
        let _ = self.audit.record_as(
            entry.execution_id,
            &entry.runbook_id,
            AuditEventType::ApprovalQueueExecuted,
            approver,
            &json!({
                "request_id": request_id.to_string(),
                "step_id": entry.step_id.as_str(),
                "action": entry.action.as_str(),
                "success": adapter_result.success,
            }),
        );
        let run_outcome = self.scheduler.resume_after_approval(&entry, &adapter_result).await?;
        Ok(ApprovalExecution {
            request_id,
            execution_id: entry.execution_id,
            action: entry.action,
            success: adapter_result.success,
            output: adapter_result.output.clone(),
            error: adapter_result.error.as_ref().map(|failure| {
                let mut error = StepError::new(failure.code, failure.message.clone());
                error.retryable = failure.retryable;
                error
            }),
            executed_at: Timestamp::now(),
            executed_by: approver.to_string(),
            run_outcome: Some(run_outcome),
        })
    }

    /// Denies a pending entry and fails its parked run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the entry is missing or the store fails.
    pub async fn deny_request(
        &self,
        request_id: RequestId,
        reason: &str,
    ) -> Result<ApprovalQueueEntry, EngineError> {
        let entry = self.queue.deny(request_id, reason)?;
        self.scheduler
            .fail_awaiting_approval(
                entry.execution_id,
                ErrorCode::ApprovalDenied,
                &format!("approval denied: {reason}"),
            )
            .await?;
        Ok(entry)
    }

    /// Lists pending entries, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub fn list_pending_approvals(
        &self,
        limit: usize,
    ) -> Result<Vec<ApprovalQueueEntry>, StoreError> {
        self.queue.list_pending(limit)
    }

    /// Bulk-expires stale entries; returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sweep fails.
    pub fn expire_stale(&self) -> Result<u64, StoreError> {
        self.queue.expire_stale()
    }

    /// Executes the frozen action against the live adapter.
    async fn execute_frozen(&self, entry: &ApprovalQueueEntry) -> AdapterResult {
        let params: Map<String, Value> = match serde_json::from_str(&entry.parameters_json) {
            Ok(params) => params,
            Err(err) => {
                return failure_result(
                    entry.action,
                    entry.executor.clone(),
                    0,
                    ErrorCode::InternalError,
                    format!("frozen parameters unreadable: {err}"),
                );
            }
        };
        let executor = entry.executor.clone();
        let Some(adapter) = self.resolver.resolve(&executor) else {
            return failure_result(
                entry.action,
                executor.clone(),
                0,
                ErrorCode::AdapterNotFound,
                format!("no adapter registered under {executor}"),
            );
        };
        match adapter.execute(entry.action, &params, ExecutionMode::Production).await {
            Ok(result) => result,
            Err(err) => {
                let message = err.to_string();
                let code = match classify_adapter_message(&message) {
                    ErrorCode::InternalError => ErrorCode::StepExecutionError,
                    classified => classified,
                };
                warn!(request_id = %entry.request_id, code = code.as_str(), "approved action failed");
                failure_result(entry.action, executor, 0, code, message)
            }
        }
    }

    /// Builds the failure record for a lazily expired entry and fails the run.
    async fn expired_record(
        &self,
        request_id: RequestId,
        approver: &str,
    ) -> Result<ApprovalExecution, EngineError> {
        let entry = self
            .queue
            .get_by_id(request_id)?
            .ok_or(EngineError::Approval(ApprovalError::NotFound(request_id)))?;
        self.scheduler
            .fail_awaiting_approval(
                entry.execution_id,
                ErrorCode::ApprovalExpired,
                "approval expired before execution",
            )
            .await?;
        Ok(ApprovalExecution {
            request_id,
            execution_id: entry.execution_id,
            action: entry.action,
            success: false,
            output: None,
            error: Some(StepError::new(
                ErrorCode::ApprovalExpired,
                "approval expired before execution",
            )),
            executed_at: Timestamp::now(),
            executed_by: approver.to_string(),
            run_outcome: None,
        })
    }

    /// Builds the failure record for a terminal (non-pending) entry.
    fn not_pending_record(
        &self,
        request_id: RequestId,
        approver: &str,
        status: ApprovalStatus,
    ) -> Result<ApprovalExecution, EngineError> {
        let entry = self
            .queue
            .get_by_id(request_id)?
            .ok_or(EngineError::Approval(ApprovalError::NotFound(request_id)))?;
        let code = match status {
            ApprovalStatus::Denied => ErrorCode::ApprovalDenied,
            ApprovalStatus::Expired => ErrorCode::ApprovalExpired,
            ApprovalStatus::Approved | ApprovalStatus::Pending => ErrorCode::InvalidInput,
        };
        Ok(ApprovalExecution {
            request_id,
            execution_id: entry.execution_id,
            action: entry.action,
            success: false,
            output: None,
            error: Some(StepError::new(code, format!("approval is {status}"))),
            executed_at: Timestamp::now(),
            executed_by: approver.to_string(),
            run_outcome: None,
        })
    }
}
