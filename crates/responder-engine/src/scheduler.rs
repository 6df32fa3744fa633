// crates/responder-engine/src/scheduler.rs
// ============================================================================
// Module: Runbook Scheduler
// Description: The execution state machine driving runbooks through their lifecycle.
// Purpose: Validate, plan, gate, dispatch, roll back, and seal one run at a time.
// Dependencies: responder-adapters, responder-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The scheduler is the only mutator of an execution context. It drives the
//! state graph `idle -> validating -> planning -> {executing,
//! awaiting_approval} -> ... -> {completed, failed, cancelled}`, dispatching
//! steps in a topological order that is stable in authored order. Gating is
//! decided per step from the action classifier and the runbook's automation
//! level; an approval-gated step parks the run (persist and return), and
//! [`RunbookScheduler::resume_after_approval`] re-enters the loop once the
//! queue executor has run the approved action. Rollback replays the inverse
//! actions of successful steps in reverse completion order, best-effort.
//!
//! Two edges extend the documented graph: `validating`/`planning` may fail
//! directly, and `executing` may park on `awaiting_approval` when a gated
//! step is discovered after earlier steps already ran.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use responder_adapters::AdapterResolver;
use responder_core::AdapterResult;
use responder_core::AlertEvent;
use responder_core::ApprovalQueueEntry;
use responder_core::AuditEventType;
use responder_core::AutomationLevel;
use responder_core::ErrorCode;
use responder_core::ExecutionContext;
use responder_core::ExecutionId;
use responder_core::ExecutionMetrics;
use responder_core::ExecutionMode;
use responder_core::ExecutionResult;
use responder_core::ExecutionState;
use responder_core::ExecutionStore;
use responder_core::MetricSample;
use responder_core::MetricsStore;
use responder_core::OnErrorPolicy;
use responder_core::RequestId;
use responder_core::Runbook;
use responder_core::Step;
use responder_core::StepError;
use responder_core::StepId;
use responder_core::StepResult;
use responder_core::TemplateContext;
use responder_core::Timestamp;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::info;
use tracing::warn;

use crate::audit::AuditLogger;
use crate::error::EngineError;
use crate::executor::StepExecutor;
use crate::executor::StepOutcome;
use crate::queue::ApprovalQueue;
use crate::queue::ApprovalRequest;
use crate::simulation::SimulationEngine;

// ============================================================================
// SECTION: Trigger Interface
// ============================================================================

/// Input submitted by an external caller to start a run.
///
/// # Invariants
/// - `automation_level_override`, when set, replaces the runbook's level for
///   this run only.
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// Runbook to execute.
    pub runbook: Runbook,
    /// Triggering alert, when any.
    pub alert: Option<AlertEvent>,
    /// Side-effect mode for the run.
    pub mode: ExecutionMode,
    /// Optional automation level override.
    pub automation_level_override: Option<AutomationLevel>,
}

/// Scheduler output: a sealed run or a parked approval.
///
/// # Invariants
/// - `PendingApproval` runs have a persisted context and an enqueued entry.
#[derive(Debug, Clone)]
pub enum SchedulerOutcome {
    /// Run reached a terminal state.
    Completed(ExecutionResult),
    /// Run is parked awaiting a human approval.
    PendingApproval {
        /// Enqueued approval request.
        request_id: RequestId,
        /// Parked execution.
        execution_id: ExecutionId,
    },
}

/// Per-step gating decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gating {
    /// Execute directly.
    Execute,
    /// Record the intended action without executing (L0 or dry-run).
    PlanOnly,
    /// Simulate, enqueue an approval, and park the run.
    NeedsApproval,
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// The runbook execution state machine.
///
/// # Invariants
/// - Exactly one scheduler drives a given execution context at a time.
/// - Every state transition is validated, audited, and persisted.
pub struct RunbookScheduler {
    /// Adapter lookup capability.
    resolver: AdapterResolver,
    /// Execution persistence.
    executions: Arc<dyn ExecutionStore>,
    /// Metrics persistence.
    metrics: Arc<dyn MetricsStore>,
    /// Audit logger.
    audit: AuditLogger,
    /// Approval queue service.
    queue: ApprovalQueue,
    /// Step executor.
    executor: StepExecutor,
    /// Simulation engine.
    simulation: SimulationEngine,
    /// Cooperative cancellation requests checked between waves.
    cancel_requests: Mutex<BTreeSet<ExecutionId>>,
}

impl RunbookScheduler {
    /// Creates a scheduler over the given collaborators.
    #[must_use]
    pub fn new(
        resolver: AdapterResolver,
        executions: Arc<dyn ExecutionStore>,
        metrics: Arc<dyn MetricsStore>,
        audit: AuditLogger,
        queue: ApprovalQueue,
    ) -> Self {
        Self {
            executor: StepExecutor::new(resolver.clone()),
            simulation: SimulationEngine::new(resolver.clone()),
            resolver,
            executions,
            metrics,
            audit,
            queue,
            cancel_requests: Mutex::new(BTreeSet::new()),
        }
    }

    /// Requests cooperative cancellation of a run.
    ///
    /// Parked runs are failed immediately; active runs observe the request
    /// at the next wave boundary.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when persistence fails.
    pub async fn cancel(&self, execution_id: ExecutionId) -> Result<(), EngineError> {
        self.cancel_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(execution_id);
        let Some(snapshot) = self.executions.load_context_snapshot(execution_id)? else {
            return Ok(());
        };
        let ctx = ExecutionContext::restore(&snapshot)?;
        if ctx.state == ExecutionState::AwaitingApproval {
            let Some(runbook) = self.executions.load_runbook(execution_id)? else {
                return Err(EngineError::ExecutionNotFound(execution_id));
            };
            let results = self.executions.list_step_results(execution_id)?;
            self.seal(
                ctx,
                &runbook,
                results,
                ExecutionState::Cancelled,
                Some((ErrorCode::ExecCancelled, "execution cancelled".to_string())),
            )?;
        }
        Ok(())
    }

    /// Executes a runbook from a trigger request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on infrastructure failures; runbook and step
    /// failures are carried in the returned outcome.
    pub async fn execute(&self, request: TriggerRequest) -> Result<SchedulerOutcome, EngineError> {
        let TriggerRequest {
            runbook,
            alert,
            mode,
            automation_level_override,
        } = request;
        let level = automation_level_override.unwrap_or(runbook.config.automation_level);
        let mut ctx =
            ExecutionContext::new(runbook.id.clone(), runbook.version.clone(), mode, alert);
        ctx.variables.insert("automation_level".to_string(), json!(level));
        self.executions.create_execution(&ctx, &runbook)?;
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            AuditEventType::ExecutionStarted,
            &json!({
                "runbook_id": runbook.id.as_str(),
                "runbook_version": runbook.version,
                "mode": mode.as_str(),
                "automation_level": level,
            }),
        )?;
        info!(execution_id = %ctx.execution_id, runbook = runbook.id.as_str(), "execution started");

        self.transition(&mut ctx, ExecutionState::Validating)?;
        if let Err(message) = self.validate(&runbook) {
            let result = self.seal(
                ctx,
                &runbook,
                Vec::new(),
                ExecutionState::Failed,
                Some((ErrorCode::ExecValidationFailed, message)),
            )?;
            return Ok(SchedulerOutcome::Completed(result));
        }
        self.transition(&mut ctx, ExecutionState::Planning)?;
        self.drive(ctx, &runbook, level, Vec::new()).await
    }

    /// Re-enters a parked run after its approved action executed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the run is missing or not parked.
    pub async fn resume_after_approval(
        &self,
        entry: &ApprovalQueueEntry,
        executed: &AdapterResult,
    ) -> Result<SchedulerOutcome, EngineError> {
        let (mut ctx, runbook, mut results) = self.restore_parked(entry.execution_id)?;
        let level = effective_level(&ctx, &runbook);
        self.transition(&mut ctx, ExecutionState::Executing)?;

        let step = runbook.step(&entry.step_id).cloned();
        let started_at = Timestamp::now();
        let step_result = StepResult {
            step_id: entry.step_id.clone(),
            step_name: entry.step_name.clone(),
            action: entry.action,
            success: executed.success,
            skipped: false,
            started_at,
            completed_at: Timestamp::now(),
            duration_ms: executed.duration_ms,
            output: executed.output.clone(),
            error: executed.error.as_ref().map(|failure| {
                let mut error = StepError::new(ErrorCode::StepExecutionFailed, failure.message.clone());
                error.retryable = failure.retryable;
                error
            }),
            rolled_back: false,
        };
        self.record_step(&mut ctx, &step_result)?;
        results.push(step_result.clone());

        if !step_result.success {
            let on_error = step.as_ref().map_or(OnErrorPolicy::Halt, |s| s.on_error);
            if matches!(on_error, OnErrorPolicy::Halt) {
                let result = self
                    .fail_with_rollback(
                        ctx,
                        &runbook,
                        results,
                        ErrorCode::PlaybookStepFailed,
                        format!("approved step {} failed", entry.step_id),
                    )
                    .await?;
                return Ok(SchedulerOutcome::Completed(result));
            }
        }
        self.drive(ctx, &runbook, level, results).await
    }

    /// Fails a parked run after a denial or expiry.
    ///
    /// No-op when the run is already terminal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the run is missing or persistence fails.
    pub async fn fail_awaiting_approval(
        &self,
        execution_id: ExecutionId,
        code: ErrorCode,
        message: &str,
    ) -> Result<(), EngineError> {
        let Some(snapshot) = self.executions.load_context_snapshot(execution_id)? else {
            return Err(EngineError::ExecutionNotFound(execution_id));
        };
        let ctx = ExecutionContext::restore(&snapshot)?;
        if ctx.state.is_terminal() {
            return Ok(());
        }
        if ctx.state != ExecutionState::AwaitingApproval {
            return Err(EngineError::NotAwaitingApproval {
                execution_id,
                state: ctx.state,
            });
        }
        let Some(runbook) = self.executions.load_runbook(execution_id)? else {
            return Err(EngineError::ExecutionNotFound(execution_id));
        };
        let results = self.executions.list_step_results(execution_id)?;
        let _ = self
            .fail_with_rollback(ctx, &runbook, results, code, message.to_string())
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Run driving
    // ------------------------------------------------------------------

    /// Drives the remaining steps of a run to a terminal state or a park.
    async fn drive(
        &self,
        mut ctx: ExecutionContext,
        runbook: &Runbook,
        level: AutomationLevel,
        mut results: Vec<StepResult>,
    ) -> Result<SchedulerOutcome, EngineError> {
        let order: Vec<Step> = match runbook.execution_order() {
            Ok(order) => order.into_iter().cloned().collect(),
            Err(err) => {
                let result = self.seal(
                    ctx,
                    runbook,
                    results,
                    ExecutionState::Failed,
                    Some((ErrorCode::PlaybookInvalid, err.to_string())),
                )?;
                return Ok(SchedulerOutcome::Completed(result));
            }
        };
        let deadline = ctx.started_at.plus_seconds(runbook.config.max_execution_time);

        loop {
            if self.cancelled(ctx.execution_id) {
                let result = self
                    .fail_with_rollback(
                        ctx,
                        runbook,
                        results,
                        ErrorCode::ExecCancelled,
                        "execution cancelled".to_string(),
                    )
                    .await?;
                return Ok(SchedulerOutcome::Completed(result));
            }
            let remaining: Vec<&Step> = order
                .iter()
                .filter(|step| !ctx.completed_steps.contains(&step.id))
                .collect();
            if remaining.is_empty() {
                if ctx.state != ExecutionState::Executing {
                    self.transition(&mut ctx, ExecutionState::Executing)?;
                }
                let result =
                    self.seal(ctx, runbook, results, ExecutionState::Completed, None)?;
                return Ok(SchedulerOutcome::Completed(result));
            }

            let now = Timestamp::now();
            if now >= deadline {
                let result = self
                    .fail_with_rollback(
                        ctx,
                        runbook,
                        results,
                        ErrorCode::ExecTimeout,
                        format!(
                            "execution exceeded {}s deadline",
                            runbook.config.max_execution_time
                        ),
                    )
                    .await?;
                return Ok(SchedulerOutcome::Completed(result));
            }

            let ready: Vec<&Step> = remaining
                .iter()
                .copied()
                .filter(|step| {
                    step.depends_on.iter().all(|dep| ctx.completed_steps.contains(dep))
                })
                .collect();
            if ready.is_empty() {
                let result = self.seal(
                    ctx,
                    runbook,
                    results,
                    ExecutionState::Failed,
                    Some((
                        ErrorCode::PlaybookInvalid,
                        "no ready step; dependency graph is stuck".to_string(),
                    )),
                )?;
                return Ok(SchedulerOutcome::Completed(result));
            }

            let wave: Vec<&Step> =
                if runbook.config.parallel_execution { ready } else { vec![ready[0]] };

            // Split the wave at the first approval gate; everything before it
            // runs this iteration, the gated step parks the run.
            let gate_position = wave
                .iter()
                .position(|step| self.gate(step, level, ctx.mode, runbook) == Gating::NeedsApproval);
            let runnable: Vec<&Step> = match gate_position {
                Some(position) => wave[.. position].to_vec(),
                None => wave.clone(),
            };

            for step in &runnable {
                if self.gate(step, level, ctx.mode, runbook) == Gating::PlanOnly {
                    let planned = planned_result(step);
                    self.audit.record(
                        ctx.execution_id,
                        &ctx.runbook_id,
                        AuditEventType::StepCompleted,
                        &json!({
                            "step_id": step.id.as_str(),
                            "action": step.action.as_str(),
                            "planned": true,
                        }),
                    )?;
                    self.record_step(&mut ctx, &planned)?;
                    results.push(planned);
                }
            }
            let executable: Vec<&Step> = runnable
                .iter()
                .copied()
                .filter(|step| self.gate(step, level, ctx.mode, runbook) == Gating::Execute)
                .collect();

            if !executable.is_empty() {
                if ctx.state != ExecutionState::Executing {
                    self.transition(&mut ctx, ExecutionState::Executing)?;
                }
                let remaining_ms = Timestamp::now().millis_until(&deadline).max(1);
                let outcomes = match timeout(
                    Duration::from_millis(remaining_ms),
                    self.execute_wave(&ctx, &executable),
                )
                .await
                {
                    Ok(outcomes) => outcomes?,
                    Err(_) => {
                        let result = self
                            .fail_with_rollback(
                                ctx,
                                runbook,
                                results,
                                ErrorCode::ExecTimeout,
                                format!(
                                    "execution exceeded {}s deadline",
                                    runbook.config.max_execution_time
                                ),
                            )
                            .await?;
                        return Ok(SchedulerOutcome::Completed(result));
                    }
                };
                for outcome in outcomes {
                    self.record_step(&mut ctx, &outcome.result)?;
                    if outcome.result.success || outcome.result.skipped {
                        self.audit.record(
                            ctx.execution_id,
                            &ctx.runbook_id,
                            AuditEventType::StepCompleted,
                            &json!({
                                "step_id": outcome.result.step_id.as_str(),
                                "action": outcome.result.action.as_str(),
                                "skipped": outcome.result.skipped,
                                "duration_ms": outcome.result.duration_ms,
                            }),
                        )?;
                    } else {
                        self.audit.record(
                            ctx.execution_id,
                            &ctx.runbook_id,
                            AuditEventType::StepFailed,
                            &json!({
                                "step_id": outcome.result.step_id.as_str(),
                                "action": outcome.result.action.as_str(),
                                "error": outcome.result.error.as_ref().map(|e| json!({
                                    "code": e.code.as_str(),
                                    "message": e.message,
                                })),
                            }),
                        )?;
                    }
                    let halted = !outcome.result.success && !outcome.should_continue;
                    results.push(outcome.result);
                    if halted {
                        let failed_id = results
                            .last()
                            .map_or_else(String::new, |r| r.step_id.as_str().to_string());
                        let result = self
                            .fail_with_rollback(
                                ctx,
                                runbook,
                                results,
                                ErrorCode::PlaybookStepFailed,
                                format!("step {failed_id} failed with on_error=halt"),
                            )
                            .await?;
                        return Ok(SchedulerOutcome::Completed(result));
                    }
                }
            }

            if let Some(position) = gate_position {
                return self.park_for_approval(ctx, runbook, wave[position]).await;
            }
        }
    }

    /// Executes one wave of independent steps, concurrently when possible.
    async fn execute_wave(
        &self,
        ctx: &ExecutionContext,
        steps: &[&Step],
    ) -> Result<Vec<StepOutcome>, EngineError> {
        let template = TemplateContext::from_execution(ctx);
        for step in steps {
            self.audit.record(
                ctx.execution_id,
                &ctx.runbook_id,
                AuditEventType::StepStarted,
                &json!({
                    "step_id": step.id.as_str(),
                    "action": step.action.as_str(),
                    "executor": step.executor.as_str(),
                }),
            )?;
        }
        if steps.len() == 1 {
            let outcome = self.executor.execute_step(steps[0], ctx.mode, &template).await;
            return Ok(vec![outcome]);
        }

        let limits = self.concurrency_limits(steps);
        let mut join_set: JoinSet<(usize, StepOutcome)> = JoinSet::new();
        for (index, step) in steps.iter().enumerate() {
            let executor = self.executor.clone();
            let step = (*step).clone();
            let template = template.clone();
            let mode = ctx.mode;
            let permit_source = limits.get(step.executor.as_str()).cloned();
            join_set.spawn(async move {
                let _permit = match &permit_source {
                    Some(semaphore) => semaphore.acquire().await.ok(),
                    None => None,
                };
                let outcome = executor.execute_step(&step, mode, &template).await;
                (index, outcome)
            });
        }
        // Outcomes surface in authored order; each result's `completed_at`
        // carries the wall-clock finish order the rollback pass orders by.
        let mut indexed: BTreeMap<usize, StepOutcome> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    indexed.insert(index, outcome);
                }
                Err(err) => {
                    warn!(error = %err, "step task aborted");
                }
            }
        }
        Ok(indexed.into_values().collect())
    }

    /// Builds per-adapter semaphores from declared concurrency limits.
    fn concurrency_limits(&self, steps: &[&Step]) -> BTreeMap<String, Arc<Semaphore>> {
        let mut limits = BTreeMap::new();
        for step in steps {
            let name = step.executor.as_str().to_string();
            if limits.contains_key(&name) {
                continue;
            }
            if let Some(adapter) = self.resolver.resolve(&step.executor) {
                let max = adapter.capabilities().max_concurrency;
                if max > 0 {
                    limits.insert(name, Arc::new(Semaphore::new(max)));
                }
            }
        }
        limits
    }

    /// Simulates a gated step, enqueues its approval, and parks the run.
    async fn park_for_approval(
        &self,
        mut ctx: ExecutionContext,
        runbook: &Runbook,
        step: &Step,
    ) -> Result<SchedulerOutcome, EngineError> {
        let template = TemplateContext::from_execution(&ctx);
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            AuditEventType::SimulationStarted,
            &json!({"step_id": step.id.as_str()}),
        )?;
        let report = self.simulation.simulate_steps(&[step], &template).await;
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            AuditEventType::StepSimulated,
            &json!({
                "step_id": step.id.as_str(),
                "predicted_outcome": report.predicted_outcome,
                "risk_score": report.overall_risk_score,
            }),
        )?;
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            AuditEventType::SimulationCompleted,
            &json!({
                "simulation_id": report.simulation_id.to_string(),
                "confidence": report.overall_confidence,
            }),
        )?;

        let resolved = responder_core::resolve_parameters(&step.parameters, &template);
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            AuditEventType::ApprovalRequested,
            &json!({
                "step_id": step.id.as_str(),
                "action": step.action.as_str(),
                "risk_level": report.overall_risk_level,
            }),
        )?;
        let entry = self.queue.create(&ApprovalRequest {
            execution_id: ctx.execution_id,
            runbook_id: &runbook.id,
            runbook_name: &runbook.name,
            step,
            resolved_parameters: &resolved,
            simulation: &report,
            ttl_seconds: runbook.config.approval_timeout,
        })?;
        ctx.set_current_step(step.id.clone());
        self.transition(&mut ctx, ExecutionState::AwaitingApproval)?;
        info!(
            execution_id = %ctx.execution_id,
            request_id = %entry.request_id,
            "run parked awaiting approval"
        );
        Ok(SchedulerOutcome::PendingApproval {
            request_id: entry.request_id,
            execution_id: ctx.execution_id,
        })
    }

    // ------------------------------------------------------------------
    // Gating and validation
    // ------------------------------------------------------------------

    /// Decides how one step is gated under the effective automation level.
    fn gate(
        &self,
        step: &Step,
        level: AutomationLevel,
        mode: ExecutionMode,
        runbook: &Runbook,
    ) -> Gating {
        match mode {
            ExecutionMode::DryRun => return Gating::PlanOnly,
            ExecutionMode::Simulation => return Gating::Execute,
            ExecutionMode::Production => {}
        }
        if !step.action.is_write() {
            return Gating::Execute;
        }
        match level {
            AutomationLevel::L0 => Gating::PlanOnly,
            AutomationLevel::L1 => {
                if step.approval_required || runbook.config.requires_approval {
                    Gating::NeedsApproval
                } else {
                    Gating::Execute
                }
            }
            AutomationLevel::L2 => Gating::NeedsApproval,
        }
    }

    /// Validates runbook structure and registry resolution.
    fn validate(&self, runbook: &Runbook) -> Result<(), String> {
        runbook.validate().map_err(|err| err.to_string())?;
        for step in &runbook.steps {
            let Some(adapter) = self.resolver.resolve(&step.executor) else {
                return Err(format!(
                    "step {} names unregistered executor {}",
                    step.id, step.executor
                ));
            };
            if !adapter.supported_actions().contains(&step.action) {
                return Err(format!(
                    "adapter {} does not declare action {}",
                    step.executor, step.action
                ));
            }
            if let Some(rollback) = &step.rollback {
                let executor = rollback.executor.as_ref().unwrap_or(&step.executor);
                if self.resolver.resolve(executor).is_none() {
                    return Err(format!(
                        "step {} rollback names unregistered executor {executor}",
                        step.id
                    ));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rollback and sealing
    // ------------------------------------------------------------------

    /// Fails a run, replaying rollbacks first when configured.
    async fn fail_with_rollback(
        &self,
        mut ctx: ExecutionContext,
        runbook: &Runbook,
        mut results: Vec<StepResult>,
        code: ErrorCode,
        message: String,
    ) -> Result<ExecutionResult, EngineError> {
        // Reverse completion-timestamp order: within a parallel wave results
        // are recorded in authored order, so `completed_at` is the authority.
        // The stable sort keeps reverse record order among equal timestamps.
        let mut timestamped: Vec<(Timestamp, StepId)> = results
            .iter()
            .rev()
            .filter(|result| {
                result.success
                    && !result.skipped
                    && runbook.step(&result.step_id).is_some_and(|step| step.rollback.is_some())
            })
            .map(|result| (result.completed_at, result.step_id.clone()))
            .collect();
        timestamped.sort_by_key(|(completed_at, _)| std::cmp::Reverse(*completed_at));
        let candidates: Vec<StepId> = timestamped.into_iter().map(|(_, id)| id).collect();
        let should_roll_back = runbook.config.rollback_on_failure
            && !candidates.is_empty()
            && ctx.state == ExecutionState::Executing;
        if should_roll_back {
            self.transition(&mut ctx, ExecutionState::RollingBack)?;
            self.audit.record(
                ctx.execution_id,
                &ctx.runbook_id,
                AuditEventType::RollbackStarted,
                &json!({"steps": candidates.iter().map(StepId::as_str).collect::<Vec<_>>()}),
            )?;
            let template = TemplateContext::from_execution(&ctx);
            for step_id in &candidates {
                let Some(step) = runbook.step(step_id) else {
                    continue;
                };
                let Some(rollback) = &step.rollback else {
                    continue;
                };
                match self.executor.execute_rollback(step, rollback, &template).await {
                    Ok(_) => {
                        self.executions.mark_step_rolled_back(ctx.execution_id, step_id)?;
                        for result in &mut results {
                            if &result.step_id == step_id {
                                result.rolled_back = true;
                            }
                        }
                        self.audit.record(
                            ctx.execution_id,
                            &ctx.runbook_id,
                            AuditEventType::RollbackCompleted,
                            &json!({
                                "step_id": step_id.as_str(),
                                "action": rollback.action.as_str(),
                            }),
                        )?;
                    }
                    Err(error) => {
                        warn!(step = step_id.as_str(), code = error.code.as_str(), "rollback failed");
                        self.audit.record(
                            ctx.execution_id,
                            &ctx.runbook_id,
                            AuditEventType::RollbackFailed,
                            &json!({
                                "step_id": step_id.as_str(),
                                "error": {"code": error.code.as_str(), "message": error.message},
                            }),
                        )?;
                    }
                }
            }
        }
        self.seal(ctx, runbook, results, ExecutionState::Failed, Some((code, message)))
    }

    /// Seals a run in a terminal state and persists the final result.
    fn seal(
        &self,
        mut ctx: ExecutionContext,
        runbook: &Runbook,
        results: Vec<StepResult>,
        state: ExecutionState,
        error: Option<(ErrorCode, String)>,
    ) -> Result<ExecutionResult, EngineError> {
        if !ctx.state.can_transition(state) && ctx.state != state {
            return Err(EngineError::InvalidTransition {
                from: ctx.state,
                to: state,
            });
        }
        ctx.set_state(state);
        let error_text = error.map(|(code, message)| format!("{code}: {message}"));
        if let Some(text) = &error_text {
            ctx.set_error(text.clone());
        }
        let completed_at = Timestamp::now();
        let mut metrics = ExecutionMetrics::default();
        for result in &results {
            metrics.record(result.success && !result.skipped, result.skipped);
        }
        let result = ExecutionResult {
            execution_id: ctx.execution_id,
            runbook_id: ctx.runbook_id.clone(),
            success: state == ExecutionState::Completed,
            state,
            started_at: ctx.started_at,
            completed_at,
            duration_ms: ctx.started_at.millis_until(&completed_at),
            steps_executed: results,
            error: error_text,
            metrics,
        };
        self.executions.save_context_snapshot(ctx.execution_id, &ctx.snapshot()?)?;
        self.executions.finalize_execution(&result)?;
        let event = if state == ExecutionState::Completed {
            AuditEventType::ExecutionCompleted
        } else {
            AuditEventType::ExecutionFailed
        };
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            event,
            &json!({
                "state": state.as_str(),
                "duration_ms": result.duration_ms,
                "steps_executed": result.steps_executed.len(),
                "error": result.error,
            }),
        )?;
        self.record_run_metrics(&result, runbook);
        info!(
            execution_id = %result.execution_id,
            state = state.as_str(),
            duration_ms = result.duration_ms,
            "execution sealed"
        );
        Ok(result)
    }

    /// Records run-level metric samples, best-effort.
    fn record_run_metrics(&self, result: &ExecutionResult, runbook: &Runbook) {
        let mut dimensions = BTreeMap::new();
        dimensions.insert("runbook_id".to_string(), runbook.id.as_str().to_string());
        let name = if result.success { "runs_completed" } else { "runs_failed" };
        let samples = [
            MetricSample {
                period_start: result.started_at,
                period_end: result.completed_at,
                name: name.to_string(),
                value: 1.0,
                dimensions: dimensions.clone(),
            },
            MetricSample {
                period_start: result.started_at,
                period_end: result.completed_at,
                name: "run_duration_ms".to_string(),
                value: f64_from_u64(result.duration_ms),
                dimensions,
            },
        ];
        for sample in &samples {
            if let Err(err) = self.metrics.record_metric(sample) {
                warn!(error = %err, "metric write failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Validates, audits, and persists one state transition.
    fn transition(
        &self,
        ctx: &mut ExecutionContext,
        to: ExecutionState,
    ) -> Result<(), EngineError> {
        let from = ctx.state;
        if !from.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                from,
                to,
            });
        }
        ctx.set_state(to);
        self.audit.record(
            ctx.execution_id,
            &ctx.runbook_id,
            AuditEventType::StateChanged,
            &json!({"from": from.as_str(), "to": to.as_str()}),
        )?;
        self.executions.update_execution_state(ctx.execution_id, to, None)?;
        self.executions.save_context_snapshot(ctx.execution_id, &ctx.snapshot()?)?;
        Ok(())
    }

    /// Persists one step result and updates context bookkeeping.
    fn record_step(
        &self,
        ctx: &mut ExecutionContext,
        result: &StepResult,
    ) -> Result<(), EngineError> {
        self.executions.insert_step_result(ctx.execution_id, result)?;
        if let Some(output) = &result.output {
            ctx.set_step_output(&result.step_id, output.clone());
        }
        ctx.mark_step_completed(&result.step_id);
        self.executions.save_context_snapshot(ctx.execution_id, &ctx.snapshot()?)?;
        Ok(())
    }

    /// Restores a parked execution with its runbook and prior results.
    fn restore_parked(
        &self,
        execution_id: ExecutionId,
    ) -> Result<(ExecutionContext, Runbook, Vec<StepResult>), EngineError> {
        let Some(snapshot) = self.executions.load_context_snapshot(execution_id)? else {
            return Err(EngineError::ExecutionNotFound(execution_id));
        };
        let ctx = ExecutionContext::restore(&snapshot)?;
        if ctx.state != ExecutionState::AwaitingApproval {
            return Err(EngineError::NotAwaitingApproval {
                execution_id,
                state: ctx.state,
            });
        }
        let Some(runbook) = self.executions.load_runbook(execution_id)? else {
            return Err(EngineError::ExecutionNotFound(execution_id));
        };
        let results = self.executions.list_step_results(execution_id)?;
        Ok((ctx, runbook, results))
    }

    /// Returns and clears the cancellation flag for an execution.
    fn cancelled(&self, execution_id: ExecutionId) -> bool {
        self.cancel_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&execution_id)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the automation level persisted with the run (override-aware).
fn effective_level(ctx: &ExecutionContext, runbook: &Runbook) -> AutomationLevel {
    ctx.variables
        .get("automation_level")
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or(runbook.config.automation_level)
}

/// Builds the plan-only result recorded for gated-out write steps.
fn planned_result(step: &Step) -> StepResult {
    let now = Timestamp::now();
    StepResult {
        step_id: step.id.clone(),
        step_name: step.name.clone(),
        action: step.action,
        success: true,
        skipped: true,
        started_at: now,
        completed_at: now,
        duration_ms: 0,
        output: Some(json!({"planned": true, "executor": step.executor.as_str()})),
        error: None,
        rolled_back: false,
    }
}

/// Converts a duration counter to a metric value.
fn f64_from_u64(value: u64) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "durations fit well inside f64 mantissa")]
    let converted = value as f64;
    converted
}
