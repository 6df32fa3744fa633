// crates/responder-adapters/tests/registry_unit.rs
// ============================================================================
// Module: Adapter Registry Unit Tests
// Description: Targeted tests for registration, indexing, and sweeps.
// Purpose: Validate name uniqueness, the action reverse index, and the
//          resolver capability.
// ============================================================================

//! ## Overview
//! Unit-level tests for the adapter registry:
//! - Name collisions fail registration
//! - The action reverse index tracks register/unregister atomically
//! - The resolver capability sees registrations immediately
//! - Health sweeps record reports per adapter

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use responder_adapters::AdapterRegistry;
use responder_adapters::RegistryError;
use responder_adapters::ScriptedAdapter;
use responder_core::Action;
use responder_core::AdapterConfig;
use responder_core::AdapterName;
use responder_core::HealthState;
use responder_core::RetryPolicy;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn scripted(name: &str, actions: &[Action]) -> Arc<ScriptedAdapter> {
    Arc::new(ScriptedAdapter::new(name, actions.iter().copied()))
}

// ============================================================================
// SECTION: Registration
// ============================================================================

#[tokio::test]
async fn register_then_get_round_trips() {
    let registry = AdapterRegistry::new();
    registry
        .register(scripted("edr", &[Action::IsolateHost]), AdapterConfig::default())
        .await
        .expect("register");
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&AdapterName::new("edr")).is_some());
    assert!(registry.get(&AdapterName::new("missing")).is_none());
}

#[tokio::test]
async fn name_collision_fails_registration() {
    let registry = AdapterRegistry::new();
    registry
        .register(scripted("edr", &[Action::IsolateHost]), AdapterConfig::default())
        .await
        .expect("register");
    let outcome = registry
        .register(scripted("edr", &[Action::BlockIp]), AdapterConfig::default())
        .await;
    assert!(matches!(outcome, Err(RegistryError::AlreadyRegistered(name)) if name.as_str() == "edr"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn unregister_removes_reverse_index_entries() {
    let registry = AdapterRegistry::new();
    registry
        .register(
            scripted("edr", &[Action::IsolateHost, Action::RetrieveEdrData]),
            AdapterConfig::default(),
        )
        .await
        .expect("register");
    registry
        .register(scripted("fw", &[Action::BlockIp]), AdapterConfig::default())
        .await
        .expect("register");
    assert_eq!(registry.get_for_action(Action::IsolateHost).len(), 1);

    registry.unregister(&AdapterName::new("edr")).expect("unregister");
    assert!(registry.get_for_action(Action::IsolateHost).is_empty());
    assert!(registry.get_for_action(Action::RetrieveEdrData).is_empty());
    assert_eq!(registry.get_for_action(Action::BlockIp).len(), 1);
    assert!(matches!(
        registry.unregister(&AdapterName::new("edr")),
        Err(RegistryError::NotRegistered(_))
    ));
}

#[tokio::test]
async fn get_for_action_returns_every_declaring_adapter() {
    let registry = AdapterRegistry::new();
    registry
        .register(scripted("edr-a", &[Action::IsolateHost]), AdapterConfig::default())
        .await
        .expect("register");
    registry
        .register(scripted("edr-b", &[Action::IsolateHost]), AdapterConfig::default())
        .await
        .expect("register");
    assert_eq!(registry.get_for_action(Action::IsolateHost).len(), 2);
    assert_eq!(registry.list().len(), 2);
}

// ============================================================================
// SECTION: Resolver Capability
// ============================================================================

#[tokio::test]
async fn resolver_sees_registrations_immediately() {
    let registry = AdapterRegistry::new();
    let resolver = registry.resolver();
    assert!(resolver.resolve(&AdapterName::new("siem")).is_none());
    registry
        .register(scripted("siem", &[Action::QuerySiem]), AdapterConfig::default())
        .await
        .expect("register");
    assert!(resolver.resolve(&AdapterName::new("siem")).is_some());
}

#[tokio::test]
async fn resolver_exposes_the_configured_retry_policy() {
    let registry = AdapterRegistry::new();
    let config = AdapterConfig {
        retry: RetryPolicy {
            max_attempts: 4,
            backoff_ms: 10,
            exponential: false,
        },
        ..AdapterConfig::default()
    };
    registry
        .register(scripted("siem", &[Action::QuerySiem]), config)
        .await
        .expect("register");
    let policy = registry.resolver().retry_policy(&AdapterName::new("siem")).expect("policy");
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(policy.backoff_ms, 10);
}

// ============================================================================
// SECTION: Sweeps
// ============================================================================

#[tokio::test]
async fn health_sweep_records_reports() {
    let registry = AdapterRegistry::new();
    registry
        .register(scripted("edr", &[Action::IsolateHost]), AdapterConfig::default())
        .await
        .expect("register");
    let reports = registry.health_check_all().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[&AdapterName::new("edr")].status, HealthState::Healthy);
    let registration = registry.registration(&AdapterName::new("edr")).expect("registration");
    assert!(registration.last_health_check.is_some());
}

#[tokio::test]
async fn shutdown_sweep_covers_every_adapter() {
    let registry = AdapterRegistry::new();
    registry
        .register(scripted("edr", &[Action::IsolateHost]), AdapterConfig::default())
        .await
        .expect("register");
    registry
        .register(scripted("fw", &[Action::BlockIp]), AdapterConfig::default())
        .await
        .expect("register");
    let outcomes = registry.shutdown_all().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, result)| result.is_ok()));
}
