// crates/responder-engine/tests/scheduler_unit.rs
// ============================================================================
// Module: Scheduler Unit Tests
// Description: Targeted tests for the execution state machine happy paths.
// Purpose: Validate state sequences, audit ordering, gating, timeouts,
//          retries, and error policies.
// ============================================================================

//! ## Overview
//! Unit-level tests for the runbook scheduler driven through scripted
//! adapters and an in-memory store:
//! - Read-only runs complete with the canonical audit sequence
//! - Zero-step runs traverse the full state graph
//! - Validation failures terminate without executing anything
//! - `on_error` policies and condition guards decide continuation
//! - Plan-only gating (L0, dry-run) never touches adapters
//! - Step timeouts and retry policies behave as configured

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use responder_adapters::AdapterRegistry;
use responder_adapters::ScriptedAdapter;
use responder_adapters::ScriptedOutcome;
use responder_core::Action;
use responder_core::AdapterConfig;
use responder_core::AdapterName;
use responder_core::AlertEvent;
use responder_core::AuditEventType;
use responder_core::AutomationLevel;
use responder_core::ErrorCode;
use responder_core::ExecutionMode;
use responder_core::ExecutionState;
use responder_core::OnErrorPolicy;
use responder_core::Runbook;
use responder_core::RunbookConfig;
use responder_core::RunbookId;
use responder_core::RunbookMetadata;
use responder_core::RunbookTriggers;
use responder_core::Severity;
use responder_core::Step;
use responder_core::StepId;
use responder_core::Timestamp;
use responder_engine::ApprovalQueue;
use responder_engine::AuditLogger;
use responder_engine::RunbookScheduler;
use responder_engine::SchedulerOutcome;
use responder_engine::TriggerRequest;
use responder_store_sqlite::SqliteStore;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

struct Harness {
    scheduler: Arc<RunbookScheduler>,
    audit: AuditLogger,
}

async fn harness(adapters: Vec<Arc<ScriptedAdapter>>) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter, AdapterConfig::default()).await.expect("register");
    }
    let audit = AuditLogger::new(store.clone());
    let queue = ApprovalQueue::new(store.clone(), audit.clone());
    let scheduler = Arc::new(RunbookScheduler::new(
        registry.resolver(),
        store.clone(),
        store.clone(),
        audit.clone(),
        queue,
    ));
    Harness {
        scheduler,
        audit,
    }
}

fn sample_alert() -> AlertEvent {
    AlertEvent {
        alert_id: "alert-7".to_string(),
        title: "Suspicious beacon".to_string(),
        severity: Severity::High,
        source: "edr".to_string(),
        techniques: vec!["T1071".to_string()],
        platform: Some("windows".to_string()),
        observed_at: Timestamp::parse("2026-03-01T08:00:00.000Z").expect("timestamp"),
        data: json!({"host": {"hostname": "ws-42"}, "source_ip": "203.0.113.9"}),
    }
}

fn step(id: &str, action: Action, executor: &str) -> Step {
    Step {
        id: StepId::new(id),
        name: format!("step {id}"),
        action,
        executor: AdapterName::new(executor),
        parameters: BTreeMap::new(),
        depends_on: BTreeSet::new(),
        condition: None,
        timeout: 30,
        on_error: OnErrorPolicy::Halt,
        approval_required: false,
        rollback: None,
    }
}

fn runbook(level: AutomationLevel, steps: Vec<Step>) -> Runbook {
    Runbook {
        id: RunbookId::new("rb-triage"),
        version: "1.0.0".to_string(),
        name: "Triage".to_string(),
        metadata: RunbookMetadata::default(),
        triggers: RunbookTriggers::default(),
        config: RunbookConfig {
            automation_level: level,
            max_execution_time: 120,
            requires_approval: false,
            approval_timeout: 3_600,
            parallel_execution: false,
            rollback_on_failure: false,
        },
        steps,
    }
}

fn trigger(book: Runbook) -> TriggerRequest {
    TriggerRequest {
        runbook: book,
        alert: Some(sample_alert()),
        mode: ExecutionMode::Production,
        automation_level_override: None,
    }
}

fn events(audit: &AuditLogger, execution_id: responder_core::ExecutionId) -> Vec<AuditEventType> {
    audit
        .execution_log(execution_id)
        .expect("log")
        .into_iter()
        .map(|entry| entry.event_type)
        .collect()
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

#[tokio::test]
async fn read_only_run_completes_with_canonical_audit_sequence() {
    let siem = Arc::new(
        ScriptedAdapter::new("siem", [Action::CollectLogs]).with_outcome(
            Action::CollectLogs,
            ScriptedOutcome::Succeed {
                output: json!({"event_count": 42}),
            },
        ),
    );
    let harness = harness(vec![Arc::clone(&siem)]).await;
    let book = runbook(AutomationLevel::L1, vec![step("s1", Action::CollectLogs, "siem")]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert_eq!(result.state, ExecutionState::Completed);
    assert_eq!(result.steps_executed.len(), 1);
    assert!(result.steps_executed[0].success);
    assert_eq!(result.steps_executed[0].output, Some(json!({"event_count": 42})));
    assert_eq!(result.metrics.steps_succeeded, 1);

    assert_eq!(
        events(&harness.audit, result.execution_id),
        vec![
            AuditEventType::ExecutionStarted,
            AuditEventType::StateChanged,
            AuditEventType::StateChanged,
            AuditEventType::StateChanged,
            AuditEventType::StepStarted,
            AuditEventType::StepCompleted,
            AuditEventType::ExecutionCompleted,
        ]
    );
    let verification = harness.audit.verify_execution(result.execution_id).expect("verify");
    assert!(verification.valid);

    let calls = siem.recorded_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].mode, ExecutionMode::Production);
}

#[tokio::test]
async fn zero_step_run_traverses_the_full_state_graph() {
    let harness = harness(vec![]).await;
    let book = runbook(AutomationLevel::L1, vec![]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert!(result.steps_executed.is_empty());

    let log = harness.audit.execution_log(result.execution_id).expect("log");
    let transitions: Vec<(String, String)> = log
        .iter()
        .filter(|entry| entry.event_type == AuditEventType::StateChanged)
        .map(|entry| {
            let details: serde_json::Value =
                serde_json::from_str(&entry.details_json).expect("details");
            (
                details["from"].as_str().expect("from").to_string(),
                details["to"].as_str().expect("to").to_string(),
            )
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("idle".to_string(), "validating".to_string()),
            ("validating".to_string(), "planning".to_string()),
            ("planning".to_string(), "executing".to_string()),
        ]
    );
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[tokio::test]
async fn unregistered_executor_fails_validation() {
    let harness = harness(vec![]).await;
    let book = runbook(AutomationLevel::L1, vec![step("s1", Action::CollectLogs, "ghost")]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(!result.success);
    assert_eq!(result.state, ExecutionState::Failed);
    assert!(result.error.expect("error").contains("EXEC_VALIDATION_FAILED"));
}

#[tokio::test]
async fn undeclared_action_fails_validation() {
    let siem = Arc::new(ScriptedAdapter::new("siem", [Action::CollectLogs]));
    let harness = harness(vec![siem]).await;
    let book = runbook(AutomationLevel::L1, vec![step("s1", Action::QuerySiem, "siem")]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(!result.success);
    assert!(result.error.expect("error").contains("EXEC_VALIDATION_FAILED"));
}

// ============================================================================
// SECTION: Error Policies and Guards
// ============================================================================

#[tokio::test]
async fn continue_policy_records_the_failure_and_advances() {
    let siem = Arc::new(
        ScriptedAdapter::new("siem", [Action::CollectLogs, Action::QuerySiem]).with_outcome(
            Action::CollectLogs,
            ScriptedOutcome::Fail {
                code: ErrorCode::AdapterExecutionFailed,
                message: "index offline".to_string(),
            },
        ),
    );
    let harness = harness(vec![siem]).await;
    let mut first = step("s1", Action::CollectLogs, "siem");
    first.on_error = OnErrorPolicy::Continue;
    let book = runbook(AutomationLevel::L1, vec![first, step("s2", Action::QuerySiem, "siem")]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert_eq!(result.steps_executed.len(), 2);
    assert!(!result.steps_executed[0].success);
    assert_eq!(
        result.steps_executed[0].error.as_ref().expect("error").code,
        ErrorCode::StepExecutionFailed
    );
    assert!(result.steps_executed[1].success);
    assert_eq!(result.metrics.steps_failed, 1);
    assert_eq!(result.metrics.steps_succeeded, 1);
}

#[tokio::test]
async fn false_condition_skips_the_step() {
    let siem = Arc::new(ScriptedAdapter::new("siem", [Action::CollectLogs]));
    let harness = harness(vec![Arc::clone(&siem)]).await;
    let mut guarded = step("s1", Action::CollectLogs, "siem");
    guarded.condition = Some("{{alert.severity}} == critical".to_string());
    let book = runbook(AutomationLevel::L1, vec![guarded]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert!(result.steps_executed[0].skipped);
    assert!(siem.recorded_calls().is_empty());
}

// ============================================================================
// SECTION: Plan-Only Gating
// ============================================================================

#[tokio::test]
async fn l0_records_write_intent_without_executing() {
    let edr = Arc::new(ScriptedAdapter::new("edr", [Action::IsolateHost]));
    let harness = harness(vec![Arc::clone(&edr)]).await;
    let book = runbook(AutomationLevel::L0, vec![step("s1", Action::IsolateHost, "edr")]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert!(result.steps_executed[0].skipped);
    assert_eq!(
        result.steps_executed[0].output.as_ref().expect("output")["planned"],
        json!(true)
    );
    assert!(edr.recorded_calls().is_empty());
}

#[tokio::test]
async fn dry_run_plans_every_step() {
    let siem = Arc::new(ScriptedAdapter::new("siem", [Action::CollectLogs]));
    let edr = Arc::new(ScriptedAdapter::new("edr", [Action::IsolateHost]));
    let harness = harness(vec![Arc::clone(&siem), Arc::clone(&edr)]).await;
    let book = runbook(
        AutomationLevel::L1,
        vec![step("s1", Action::CollectLogs, "siem"), step("s2", Action::IsolateHost, "edr")],
    );
    let request = TriggerRequest {
        mode: ExecutionMode::DryRun,
        ..trigger(book)
    };

    let outcome = harness.scheduler.execute(request).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert_eq!(result.metrics.steps_skipped, 2);
    assert!(siem.recorded_calls().is_empty());
    assert!(edr.recorded_calls().is_empty());
}

// ============================================================================
// SECTION: Timeouts and Retries
// ============================================================================

#[tokio::test]
async fn zero_timeout_fails_immediately_with_step_timeout() {
    let siem = Arc::new(ScriptedAdapter::new("siem", [Action::CollectLogs]));
    let harness = harness(vec![siem]).await;
    let mut hung = step("s1", Action::CollectLogs, "siem");
    hung.timeout = 0;
    let book = runbook(AutomationLevel::L1, vec![hung]);

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(!result.success);
    assert_eq!(
        result.steps_executed[0].error.as_ref().expect("error").code,
        ErrorCode::StepTimeout
    );
}

#[tokio::test]
async fn retryable_failures_respect_the_attempt_budget() {
    let siem = Arc::new(
        ScriptedAdapter::new("siem", [Action::CollectLogs]).with_outcome(
            Action::CollectLogs,
            ScriptedOutcome::Raise {
                message: "connect ECONNREFUSED 10.9.8.7:443".to_string(),
            },
        ),
    );
    let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
    let registry = AdapterRegistry::new();
    let config = AdapterConfig {
        retry: responder_core::RetryPolicy {
            max_attempts: 3,
            backoff_ms: 1,
            exponential: false,
        },
        ..AdapterConfig::default()
    };
    registry.register(siem.clone(), config).await.expect("register");
    let audit = AuditLogger::new(store.clone());
    let queue = ApprovalQueue::new(store.clone(), audit.clone());
    let scheduler = RunbookScheduler::new(
        registry.resolver(),
        store.clone(),
        store.clone(),
        audit.clone(),
        queue,
    );
    let book = runbook(AutomationLevel::L1, vec![step("s1", Action::CollectLogs, "siem")]);

    let outcome = scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(!result.success);
    let error = result.steps_executed[0].error.as_ref().expect("error");
    assert_eq!(error.code, ErrorCode::AdapterConnection);
    assert!(error.retryable);
    // One initial attempt plus two retries, invisible to the audit log.
    assert_eq!(siem.recorded_calls().len(), 3);
    let step_failures = audit
        .execution_log(result.execution_id)
        .expect("log")
        .into_iter()
        .filter(|entry| entry.event_type == AuditEventType::StepFailed)
        .count();
    assert_eq!(step_failures, 1);
}

// ============================================================================
// SECTION: Parallel Waves
// ============================================================================

#[tokio::test]
async fn independent_steps_run_in_one_parallel_wave() {
    let siem = Arc::new(
        ScriptedAdapter::new("siem", [Action::CollectLogs, Action::QuerySiem])
            .with_outcome(
                Action::CollectLogs,
                ScriptedOutcome::Succeed {
                    output: json!({"stream": "a"}),
                },
            )
            .with_outcome(
                Action::QuerySiem,
                ScriptedOutcome::Succeed {
                    output: json!({"stream": "b"}),
                },
            )
            .with_max_concurrency(1),
    );
    let harness = harness(vec![Arc::clone(&siem)]).await;
    let mut book = runbook(
        AutomationLevel::L1,
        vec![step("s1", Action::CollectLogs, "siem"), step("s2", Action::QuerySiem, "siem")],
    );
    book.config.parallel_execution = true;

    let outcome = harness.scheduler.execute(trigger(book)).await.expect("execute");
    let SchedulerOutcome::Completed(result) = outcome else {
        panic!("expected completed run");
    };
    assert!(result.success);
    assert_eq!(result.steps_executed.len(), 2);
    // Results surface in authored order regardless of completion order.
    assert_eq!(result.steps_executed[0].step_id, StepId::new("s1"));
    assert_eq!(result.steps_executed[1].step_id, StepId::new("s2"));
    assert_eq!(siem.recorded_calls().len(), 2);
}
