// crates/responder-adapters/src/scripted.rs
// ============================================================================
// Module: Scripted Adapter
// Description: Deterministic canned-outcome adapter for rehearsals and tests.
// Purpose: Exercise runbooks end to end without touching any external system.
// Dependencies: responder-core, tokio
// ============================================================================

//! ## Overview
//! The scripted adapter replays author-defined outcomes per action. It is
//! used two ways: operators rehearse runbooks against scripted fixtures
//! before wiring real vendor adapters, and the engine's own tests drive
//! every scheduler path through it. Each invocation is recorded (action,
//! parameters, mode) so callers can assert exactly what the engine
//! dispatched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use responder_core::Action;
use responder_core::Adapter;
use responder_core::AdapterCapabilities;
use responder_core::AdapterConfig;
use responder_core::AdapterError;
use responder_core::AdapterName;
use responder_core::AdapterResult;
use responder_core::ErrorCode;
use responder_core::ExecutionMode;
use responder_core::HealthReport;
use responder_core::HealthState;
use responder_core::Timestamp;
use responder_core::failure_result;
use responder_core::success_result;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Scripted Outcomes
// ============================================================================

/// Outcome replayed for one action.
///
/// # Invariants
/// - Outcomes are deterministic; the same action always replays the same way.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return a successful result with the given output.
    Succeed {
        /// Output payload.
        output: Value,
    },
    /// Return a failed result with the given code and message.
    Fail {
        /// Stable error code.
        code: ErrorCode,
        /// Failure message.
        message: String,
    },
    /// Raise an adapter invocation error with the given message.
    Raise {
        /// Raw error message (classified by the step executor).
        message: String,
    },
    /// Sleep before succeeding, for timeout and deadline tests.
    Stall {
        /// Sleep duration in milliseconds.
        delay_ms: u64,
        /// Output payload after the sleep.
        output: Value,
    },
}

/// One recorded invocation.
///
/// # Invariants
/// - Parameters are stored exactly as dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Action invoked.
    pub action: Action,
    /// Parameters as dispatched.
    pub params: Map<String, Value>,
    /// Mode of the invocation.
    pub mode: ExecutionMode,
    /// True when the call came through `rollback`.
    pub rollback: bool,
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Deterministic canned-outcome adapter.
///
/// # Invariants
/// - Actions without a scripted outcome succeed with a `null` output.
/// - All invocations are recorded in dispatch order.
pub struct ScriptedAdapter {
    /// Adapter name.
    name: String,
    /// Declared action set.
    actions: BTreeSet<Action>,
    /// Scripted outcomes per action.
    outcomes: BTreeMap<Action, ScriptedOutcome>,
    /// Recorded invocations in dispatch order.
    calls: Mutex<Vec<RecordedCall>>,
    /// Declared concurrency limit (0 = unlimited).
    max_concurrency: usize,
}

impl ScriptedAdapter {
    /// Creates a scripted adapter serving the given actions.
    #[must_use]
    pub fn new(name: impl Into<String>, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            name: name.into(),
            actions: actions.into_iter().collect(),
            outcomes: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
            max_concurrency: 0,
        }
    }

    /// Scripts the outcome for one action.
    #[must_use]
    pub fn with_outcome(mut self, action: Action, outcome: ScriptedOutcome) -> Self {
        self.outcomes.insert(action, outcome);
        self
    }

    /// Declares a concurrency limit.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Returns the recorded invocations in dispatch order.
    #[must_use]
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Records one invocation.
    fn record(&self, action: Action, params: &Map<String, Value>, mode: ExecutionMode, rollback: bool) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(RecordedCall {
            action,
            params: params.clone(),
            mode,
            rollback,
        });
    }

    /// Replays the scripted outcome for one action.
    async fn replay(&self, action: Action) -> Result<AdapterResult, AdapterError> {
        let executor = AdapterName::new(self.name.clone());
        let started = Instant::now();
        match self.outcomes.get(&action) {
            None => Ok(success_result(action, executor, 0, Value::Null)),
            Some(ScriptedOutcome::Succeed {
                output,
            }) => Ok(success_result(action, executor, 0, output.clone())),
            Some(ScriptedOutcome::Fail {
                code,
                message,
            }) => Ok(failure_result(action, executor, 0, *code, message.clone())),
            Some(ScriptedOutcome::Raise {
                message,
            }) => Err(AdapterError::Invocation(message.clone())),
            Some(ScriptedOutcome::Stall {
                delay_ms,
                output,
            }) => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                Ok(success_result(action, executor, elapsed, output.clone()))
            }
        }
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn supported_actions(&self) -> BTreeSet<Action> {
        self.actions.clone()
    }

    async fn initialize(&self, _config: &AdapterConfig) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn execute(
        &self,
        action: Action,
        params: &Map<String, Value>,
        mode: ExecutionMode,
    ) -> Result<AdapterResult, AdapterError> {
        if !self.actions.contains(&action) {
            return Err(AdapterError::UnsupportedAction {
                adapter: AdapterName::new(self.name.clone()),
                action,
            });
        }
        self.record(action, params, mode, false);
        self.replay(action).await
    }

    async fn rollback(
        &self,
        action: Action,
        params: &Map<String, Value>,
    ) -> Result<AdapterResult, AdapterError> {
        self.record(action, params, ExecutionMode::Production, true);
        self.replay(action).await
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport {
            status: HealthState::Healthy,
            message: Some("scripted fixture".to_string()),
            latency_ms: Some(0),
            checked_at: Timestamp::now(),
        }
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_actions: self.actions.clone(),
            supports_simulation: true,
            supports_rollback: true,
            supports_validation: false,
            max_concurrency: self.max_concurrency,
        }
    }
}
