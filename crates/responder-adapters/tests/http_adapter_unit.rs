// crates/responder-adapters/tests/http_adapter_unit.rs
// ============================================================================
// Module: HTTP Adapter Unit Tests
// Description: Targeted tests for host policy and simulation behavior.
// Purpose: Validate fail-closed policy checks without any network I/O.
// ============================================================================

//! ## Overview
//! Unit-level tests for the built-in HTTP adapter. Nothing here touches the
//! network: policy violations fail before any request is built, and
//! simulation mode predicts without sending.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use responder_adapters::HttpAdapter;
use responder_adapters::HttpAdapterConfig;
use responder_adapters::HttpHostPolicy;
use responder_core::Action;
use responder_core::Adapter;
use responder_core::AdapterError;
use responder_core::ErrorCode;
use responder_core::ExecutionMode;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn adapter_with_policy(policy: HttpHostPolicy) -> HttpAdapter {
    HttpAdapter::new(HttpAdapterConfig {
        policy,
        ..HttpAdapterConfig::default()
    })
    .expect("adapter")
}

fn params(url: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("url".to_string(), json!(url));
    map
}

// ============================================================================
// SECTION: Policy
// ============================================================================

#[tokio::test]
async fn denylisted_host_fails_closed() {
    let adapter =
        adapter_with_policy(HttpHostPolicy::new().deny_hosts(["intel.example.com"]));
    let result = adapter
        .execute(Action::HttpRequest, &params("https://intel.example.com/v1"), ExecutionMode::Simulation)
        .await
        .expect("result");
    assert!(!result.success);
    assert_eq!(result.error.expect("error").code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn private_addresses_are_denied_by_default() {
    let adapter = adapter_with_policy(HttpHostPolicy::new());
    for url in ["http://127.0.0.1/api", "http://10.0.0.8/api", "http://169.254.1.1/x"] {
        let result = adapter
            .execute(Action::HttpRequest, &params(url), ExecutionMode::Simulation)
            .await
            .expect("result");
        assert!(!result.success, "{url} should be denied");
    }
}

#[tokio::test]
async fn allowlist_restricts_to_matching_hosts() {
    let adapter = adapter_with_policy(HttpHostPolicy::new().allow_hosts([".example.com"]));
    let allowed = adapter
        .execute(Action::HttpRequest, &params("https://api.example.com/v1"), ExecutionMode::Simulation)
        .await
        .expect("result");
    assert!(allowed.success);
    let denied = adapter
        .execute(Action::HttpRequest, &params("https://other.test/v1"), ExecutionMode::Simulation)
        .await
        .expect("result");
    assert!(!denied.success);
}

#[tokio::test]
async fn non_http_schemes_are_rejected() {
    let adapter = adapter_with_policy(HttpHostPolicy::new());
    let result = adapter
        .execute(Action::HttpRequest, &params("ftp://files.example.com/a"), ExecutionMode::Simulation)
        .await
        .expect("result");
    assert!(!result.success);
}

// ============================================================================
// SECTION: Contract
// ============================================================================

#[tokio::test]
async fn unsupported_actions_are_refused() {
    let adapter = adapter_with_policy(HttpHostPolicy::new());
    let outcome = adapter
        .execute(Action::BlockIp, &params("https://api.example.com"), ExecutionMode::Simulation)
        .await;
    assert!(matches!(outcome, Err(AdapterError::UnsupportedAction { .. })));
}

#[tokio::test]
async fn simulation_predicts_without_sending() {
    let adapter = adapter_with_policy(HttpHostPolicy::new());
    let mut request = params("https://api.example.com/v1/lookup");
    request.insert("method".to_string(), json!("post"));
    request.insert("body".to_string(), json!({"indicator": "198.51.100.7"}));
    let result = adapter
        .execute(Action::HttpRequest, &request, ExecutionMode::Simulation)
        .await
        .expect("result");
    assert!(result.success);
    let output = result.output.expect("output");
    assert_eq!(output["predicted"], json!(true));
    assert_eq!(output["method"], json!("post"));
    assert_eq!(output["would_send_body"], json!(true));
}

#[test]
fn validate_parameters_reports_policy_and_shape_errors() {
    let adapter = adapter_with_policy(HttpHostPolicy::new().deny_hosts(["bad.test"]));
    let valid = adapter.validate_parameters(Action::HttpRequest, &params("https://ok.test/x"));
    assert!(valid.valid);
    let denied = adapter.validate_parameters(Action::HttpRequest, &params("https://bad.test/x"));
    assert!(!denied.valid);
    let missing = adapter.validate_parameters(Action::HttpRequest, &Map::new());
    assert!(!missing.valid);
}
