// crates/responder-engine/src/executor.rs
// ============================================================================
// Module: Step Executor
// Description: Executes one runbook step through a resolved adapter.
// Purpose: Own templating, condition guards, timeouts, retries, and classification.
// Dependencies: responder-adapters, responder-core, serde_json, tokio, tracing
// ============================================================================

//! ## Overview
//! The step executor turns one authored step into one immutable step result.
//! Parameters and the condition guard are template-resolved first; the
//! adapter call is raced against the step timeout; raised adapter errors are
//! classified by message; retries wrap the call for retryable codes only and
//! stay transparent to the audit log (one result, total wall time). The
//! `should_continue` flag encodes the step's `on_error` policy for the
//! scheduler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use responder_adapters::AdapterResolver;
use responder_core::AdapterError;
use responder_core::AdapterResult;
use responder_core::ErrorCode;
use responder_core::ExecutionMode;
use responder_core::OnErrorPolicy;
use responder_core::RetryPolicy;
use responder_core::RollbackDefinition;
use responder_core::Step;
use responder_core::StepError;
use responder_core::StepResult;
use responder_core::TemplateContext;
use responder_core::Timestamp;
use responder_core::classify_adapter_message;
use responder_core::resolve_parameters;
use responder_core::resolve_value;
use serde_json::Map;
use serde_json::Value;
use tokio::time::timeout;
use tracing::warn;

// ============================================================================
// SECTION: Step Outcome
// ============================================================================

/// Outcome of one step attempt.
///
/// # Invariants
/// - `should_continue` reflects the step's `on_error` policy.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Immutable step result.
    pub result: StepResult,
    /// Whether the scheduler may advance past this step.
    pub should_continue: bool,
    /// Whether the step declares a rollback definition.
    pub has_rollback: bool,
    /// Parameters exactly as dispatched to the adapter.
    pub resolved_parameters: Map<String, Value>,
}

// ============================================================================
// SECTION: Step Executor
// ============================================================================

/// Executes steps through adapters resolved by name.
///
/// # Invariants
/// - Retries apply only to retryable error codes and never exceed the
///   adapter's configured attempt budget.
#[derive(Clone)]
pub struct StepExecutor {
    /// Adapter lookup capability.
    resolver: AdapterResolver,
}

impl StepExecutor {
    /// Creates a step executor over the given resolver.
    #[must_use]
    pub const fn new(resolver: AdapterResolver) -> Self {
        Self {
            resolver,
        }
    }

    /// Executes one step and classifies its outcome.
    pub async fn execute_step(
        &self,
        step: &Step,
        mode: ExecutionMode,
        template: &TemplateContext,
    ) -> StepOutcome {
        let started_at = Timestamp::now();
        let resolved = resolve_parameters(&step.parameters, template);

        if let Some(condition) = &step.condition {
            let resolved_condition = render_condition(condition, template);
            if !responder_core::evaluate_condition(&resolved_condition) {
                return StepOutcome {
                    result: skipped_result(step, started_at),
                    should_continue: true,
                    has_rollback: step.rollback.is_some(),
                    resolved_parameters: resolved,
                };
            }
        }

        let Some(adapter) = self.resolver.resolve(&step.executor) else {
            let error = StepError::new(
                ErrorCode::AdapterNotFound,
                format!("no adapter registered under {}", step.executor),
            );
            return self.failed_outcome(step, started_at, error, resolved);
        };

        let retry = self.resolver.retry_policy(&step.executor).unwrap_or_default();
        let mut attempt: u32 = 0;
        let attempt_error = loop {
            let resolved_for_call = resolved.clone();
            let call = adapter.execute(step.action, &resolved_for_call, mode);
            let attempt_outcome = if step.timeout == 0 {
                Err(StepError::new(
                    ErrorCode::StepTimeout,
                    format!("step {} timed out after 0s", step.id),
                ))
            } else {
                match timeout(Duration::from_secs(step.timeout), call).await {
                    Err(_) => Err(StepError::new(
                        ErrorCode::StepTimeout,
                        format!("step {} timed out after {}s", step.id, step.timeout),
                    )),
                    Ok(Err(err)) => Err(classify_invocation_error(&err)),
                    Ok(Ok(result)) => classify_returned(result),
                }
            };
            match attempt_outcome {
                Ok(result) => {
                    return StepOutcome {
                        result: success_step_result(step, started_at, &result),
                        should_continue: true,
                        has_rollback: step.rollback.is_some(),
                        resolved_parameters: resolved,
                    };
                }
                Err(error) => {
                    if error.retryable && attempt + 1 < retry.max_attempts {
                        warn!(
                            step = step.id.as_str(),
                            code = error.code.as_str(),
                            attempt,
                            "retrying step after retryable failure"
                        );
                        sleep_before_retry(&retry, attempt).await;
                        attempt += 1;
                        continue;
                    }
                    break error;
                }
            }
        };
        self.failed_outcome(step, started_at, attempt_error, resolved)
    }

    /// Executes a rollback definition for a previously completed step.
    pub async fn execute_rollback(
        &self,
        step: &Step,
        rollback: &RollbackDefinition,
        template: &TemplateContext,
    ) -> Result<AdapterResult, StepError> {
        let executor = rollback.executor.as_ref().unwrap_or(&step.executor);
        let Some(adapter) = self.resolver.resolve(executor) else {
            return Err(StepError::new(
                ErrorCode::AdapterNotFound,
                format!("no adapter registered under {executor}"),
            ));
        };
        let params = resolve_parameters(&rollback.parameters, template);
        let call = adapter.rollback(rollback.action, &params);
        if rollback.timeout == 0 {
            return Err(StepError::new(
                ErrorCode::StepTimeout,
                format!("rollback of step {} timed out after 0s", step.id),
            ));
        }
        match timeout(Duration::from_secs(rollback.timeout), call).await {
            Err(_) => Err(StepError::new(
                ErrorCode::StepTimeout,
                format!("rollback of step {} timed out after {}s", step.id, rollback.timeout),
            )),
            Ok(Err(err)) => Err(classify_invocation_error(&err)),
            Ok(Ok(result)) => {
                if result.success {
                    Ok(result)
                } else {
                    let message = result
                        .error
                        .as_ref()
                        .map_or_else(|| "rollback failed".to_string(), |f| f.message.clone());
                    let code = result
                        .error
                        .as_ref()
                        .map_or(ErrorCode::AdapterExecutionFailed, |f| f.code);
                    Err(StepError::new(code, message))
                }
            }
        }
    }

    /// Builds a failed outcome honoring the step's `on_error` policy.
    fn failed_outcome(
        &self,
        step: &Step,
        started_at: Timestamp,
        error: StepError,
        resolved: Map<String, Value>,
    ) -> StepOutcome {
        let completed_at = Timestamp::now();
        let skipped = matches!(step.on_error, OnErrorPolicy::Skip);
        let should_continue = !matches!(step.on_error, OnErrorPolicy::Halt);
        StepOutcome {
            result: StepResult {
                step_id: step.id.clone(),
                step_name: step.name.clone(),
                action: step.action,
                success: false,
                skipped,
                started_at,
                completed_at,
                duration_ms: started_at.millis_until(&completed_at),
                output: None,
                error: Some(error),
                rolled_back: false,
            },
            should_continue,
            has_rollback: step.rollback.is_some(),
            resolved_parameters: resolved,
        }
    }
}

// ============================================================================
// SECTION: Classification Helpers
// ============================================================================

/// Classifies a raised adapter error into a step error.
fn classify_invocation_error(err: &AdapterError) -> StepError {
    match err {
        AdapterError::UnsupportedAction {
            ..
        } => StepError::new(ErrorCode::InvalidInput, err.to_string()),
        AdapterError::Initialization(message) => {
            StepError::new(ErrorCode::InternalError, message.clone())
        }
        AdapterError::Invocation(message) => {
            let code = classify_adapter_message(message);
            if matches!(code, ErrorCode::InternalError) {
                StepError::new(ErrorCode::StepExecutionError, message.clone())
            } else {
                StepError::new(code, message.clone())
            }
        }
    }
}

/// Classifies a returned adapter result.
fn classify_returned(result: AdapterResult) -> Result<AdapterResult, StepError> {
    if result.success {
        return Ok(result);
    }
    let (message, retryable) = result.error.as_ref().map_or_else(
        || ("adapter reported failure without details".to_string(), false),
        |failure| (failure.message.clone(), failure.retryable),
    );
    let mut error = StepError::new(ErrorCode::StepExecutionFailed, message);
    error.retryable = retryable;
    Err(error)
}

/// Builds the skipped result for a false condition guard.
fn skipped_result(step: &Step, started_at: Timestamp) -> StepResult {
    let completed_at = Timestamp::now();
    StepResult {
        step_id: step.id.clone(),
        step_name: step.name.clone(),
        action: step.action,
        success: true,
        skipped: true,
        started_at,
        completed_at,
        duration_ms: started_at.millis_until(&completed_at),
        output: None,
        error: None,
        rolled_back: false,
    }
}

/// Builds the success result from an adapter result.
fn success_step_result(step: &Step, started_at: Timestamp, result: &AdapterResult) -> StepResult {
    let completed_at = Timestamp::now();
    StepResult {
        step_id: step.id.clone(),
        step_name: step.name.clone(),
        action: step.action,
        success: true,
        skipped: false,
        started_at,
        completed_at,
        duration_ms: started_at.millis_until(&completed_at),
        output: result.output.clone(),
        error: None,
        rolled_back: false,
    }
}

/// Resolves a condition string through the template context.
fn render_condition(condition: &str, template: &TemplateContext) -> String {
    match resolve_value(&Value::from(condition), template) {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Sleeps the retry backoff delay for a zero-based attempt.
async fn sleep_before_retry(retry: &RetryPolicy, attempt: u32) {
    let delay = retry.delay_ms(attempt);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}
