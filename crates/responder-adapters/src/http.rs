// crates/responder-adapters/src/http.rs
// ============================================================================
// Module: HTTP Adapter
// Description: Built-in adapter serving the read-only http_request action.
// Purpose: Give runbooks a policy-guarded HTTP client for enrichment calls.
// Dependencies: responder-core, reqwest, url
// ============================================================================

//! ## Overview
//! The HTTP adapter serves `http_request` only. Host policy checks run
//! before any request is sent: denylist first, then allowlist, and private
//! or loopback IP targets are denied unless explicitly allowed. Redirects
//! are rejected and response bodies are capped. Simulation mode performs no
//! network I/O and returns the request shape that production would send.
//!
//! Security posture: remote content is untrusted and surfaces to templates
//! as opaque JSON.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;
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
use responder_core::ParameterValidation;
use responder_core::Timestamp;
use responder_core::failure_result;
use responder_core::success_result;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use url::Host;
use url::Url;

// ============================================================================
// SECTION: Host Policy
// ============================================================================

/// Host pattern: exact name or leading-dot suffix match.
///
/// # Invariants
/// - Patterns are matched case-insensitively against the URL host.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    /// Exact host name.
    Exact(String),
    /// Suffix match (`.example.com` matches any subdomain).
    Suffix(String),
}

impl HostPattern {
    /// Parses a pattern string.
    fn parse(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        if let Some(suffix) = lowered.strip_prefix('.') {
            Self::Suffix(suffix.to_string())
        } else {
            Self::Exact(lowered)
        }
    }

    /// Returns true when the pattern matches the host.
    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(name) => host == name,
            Self::Suffix(suffix) => {
                host == suffix || host.strip_suffix(suffix).is_some_and(|rest| rest.ends_with('.'))
            }
        }
    }
}

/// Host allowlist + denylist policy for outbound requests.
///
/// # Invariants
/// - Denylist rules are evaluated before allowlist rules.
/// - Private, loopback, and link-local IPs are denied unless
///   `allow_private_networks` is set.
#[derive(Debug, Clone, Default)]
pub struct HttpHostPolicy {
    /// Optional allowlist; when set, only matching hosts are allowed.
    allowlist: Option<Vec<HostPattern>>,
    /// Explicitly denied hosts, matched first.
    denylist: Vec<HostPattern>,
    /// Whether private and link-local ranges are allowed.
    allow_private_networks: bool,
}

impl HttpHostPolicy {
    /// Creates the default policy (public hosts only).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the allowlist with the provided host patterns.
    #[must_use]
    pub fn allow_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowlist =
            Some(hosts.into_iter().map(|host| HostPattern::parse(host.as_ref())).collect());
        self
    }

    /// Adds host patterns to the denylist.
    #[must_use]
    pub fn deny_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.denylist.extend(hosts.into_iter().map(|host| HostPattern::parse(host.as_ref())));
        self
    }

    /// Permits private and link-local IP targets.
    #[must_use]
    pub const fn allow_private_networks(mut self) -> Self {
        self.allow_private_networks = true;
        self
    }

    /// Checks a parsed URL against the policy.
    fn check(&self, url: &Url) -> Result<(), String> {
        let Some(host) = url.host() else {
            return Err("url has no host".to_string());
        };
        let host_text = match &host {
            Host::Domain(name) => name.to_lowercase(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };
        if self.denylist.iter().any(|pattern| pattern.matches(&host_text)) {
            return Err(format!("host denied by policy: {host_text}"));
        }
        if !self.allow_private_networks {
            let ip = match host {
                Host::Ipv4(addr) => Some(IpAddr::V4(addr)),
                Host::Ipv6(addr) => Some(IpAddr::V6(addr)),
                Host::Domain(_) => None,
            };
            if let Some(ip) = ip
                && is_private_ip(ip)
            {
                return Err(format!("private address denied by policy: {host_text}"));
            }
        }
        if let Some(allowlist) = &self.allowlist
            && !allowlist.iter().any(|pattern| pattern.matches(&host_text))
        {
            return Err(format!("host not in allowlist: {host_text}"));
        }
        Ok(())
    }
}

/// Returns true for loopback, private, and link-local addresses.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_loopback() || addr.is_private() || addr.is_link_local() || addr.is_unspecified()
        }
        IpAddr::V6(addr) => {
            addr.is_loopback() || addr.is_unspecified() || (addr.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for the HTTP adapter.
///
/// # Invariants
/// - `max_response_bytes` is a hard cap; longer bodies are truncated.
#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    /// Host policy applied before every request.
    pub policy: HttpHostPolicy,
    /// Connect/read timeout for the underlying client in seconds.
    pub request_timeout_secs: u64,
    /// Maximum response body bytes retained.
    pub max_response_bytes: usize,
}

impl Default for HttpAdapterConfig {
    fn default() -> Self {
        Self {
            policy: HttpHostPolicy::default(),
            request_timeout_secs: 30,
            max_response_bytes: 1024 * 1024,
        }
    }
}

/// Parsed `http_request` parameters.
#[derive(Debug, Deserialize)]
struct HttpRequestParams {
    /// Target URL.
    url: String,
    /// HTTP method; defaults to GET.
    #[serde(default)]
    method: Option<String>,
    /// Request headers.
    #[serde(default)]
    headers: Option<Map<String, Value>>,
    /// Optional JSON body.
    #[serde(default)]
    body: Option<Value>,
}

// ============================================================================
// SECTION: Adapter
// ============================================================================

/// Built-in HTTP adapter serving `http_request`.
///
/// # Invariants
/// - Policy checks run before any network I/O.
/// - Simulation mode performs no network I/O.
pub struct HttpAdapter {
    /// Adapter configuration.
    config: HttpAdapterConfig,
    /// Underlying HTTP client (redirects rejected).
    client: reqwest::Client,
}

impl HttpAdapter {
    /// Adapter name used by step `executor` fields.
    pub const NAME: &'static str = "http";

    /// Creates an HTTP adapter with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Initialization`] when the client cannot be built.
    pub fn new(config: HttpAdapterConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| AdapterError::Initialization(err.to_string()))?;
        Ok(Self {
            config,
            client,
        })
    }

    /// Parses and policy-checks request parameters.
    fn prepare(&self, params: &Map<String, Value>) -> Result<(HttpRequestParams, Url), String> {
        let parsed: HttpRequestParams =
            serde_json::from_value(Value::Object(params.clone())).map_err(|err| err.to_string())?;
        let url = Url::parse(&parsed.url).map_err(|err| format!("invalid url: {err}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme: {}", url.scheme()));
        }
        self.config.policy.check(&url)?;
        Ok((parsed, url))
    }

    /// Executes the request against the live backend.
    async fn send(
        &self,
        parsed: HttpRequestParams,
        url: Url,
        started: Instant,
    ) -> Result<AdapterResult, AdapterError> {
        let method = parsed.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|err| AdapterError::Invocation(format!("invalid method: {err}")))?;
        let mut request = self.client.request(method, url.clone());
        if let Some(headers) = &parsed.headers {
            for (key, value) in headers {
                if let Some(text) = value.as_str() {
                    request = request.header(key.as_str(), text);
                }
            }
        }
        if let Some(body) = &parsed.body {
            request = request.json(body);
        }
        let response =
            request.send().await.map_err(|err| AdapterError::Invocation(err.to_string()))?;
        let status = response.status();
        let bytes =
            response.bytes().await.map_err(|err| AdapterError::Invocation(err.to_string()))?;
        let truncated = bytes.len() > self.config.max_response_bytes;
        let retained = &bytes[.. bytes.len().min(self.config.max_response_bytes)];
        let body_value = serde_json::from_slice::<Value>(retained)
            .unwrap_or_else(|_| Value::from(String::from_utf8_lossy(retained).into_owned()));
        let duration_ms = duration_ms_since(started);
        let executor = AdapterName::new(Self::NAME);
        if status.is_success() {
            let output = json!({
                "status": status.as_u16(),
                "url": url.as_str(),
                "body": body_value,
                "truncated": truncated,
            });
            Ok(success_result(Action::HttpRequest, executor, duration_ms, output))
        } else {
            let code = match status.as_u16() {
                401 | 403 => ErrorCode::AdapterAuth,
                429 => ErrorCode::AdapterRateLimit,
                _ => ErrorCode::AdapterExecutionFailed,
            };
            let message = format!("http status {status} from {url}");
            Ok(failure_result(Action::HttpRequest, executor, duration_ms, code, message))
        }
    }
}

/// Returns elapsed milliseconds since `started`.
fn duration_ms_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn supported_actions(&self) -> BTreeSet<Action> {
        BTreeSet::from([Action::HttpRequest])
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
        if action != Action::HttpRequest {
            return Err(AdapterError::UnsupportedAction {
                adapter: AdapterName::new(Self::NAME),
                action,
            });
        }
        let started = Instant::now();
        let executor = AdapterName::new(Self::NAME);
        let (parsed, url) = match self.prepare(params) {
            Ok(prepared) => prepared,
            Err(message) => {
                return Ok(failure_result(
                    action,
                    executor,
                    duration_ms_since(started),
                    ErrorCode::InvalidInput,
                    message,
                ));
            }
        };
        match mode {
            ExecutionMode::Production => self.send(parsed, url, started).await,
            ExecutionMode::Simulation | ExecutionMode::DryRun => {
                let output = json!({
                    "predicted": true,
                    "url": url.as_str(),
                    "method": parsed.method.as_deref().unwrap_or("GET"),
                    "would_send_body": parsed.body.is_some(),
                });
                Ok(success_result(action, executor, duration_ms_since(started), output))
            }
        }
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport {
            status: HealthState::Healthy,
            message: Some("client ready".to_string()),
            latency_ms: None,
            checked_at: Timestamp::now(),
        }
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_actions: self.supported_actions(),
            supports_simulation: true,
            supports_rollback: false,
            supports_validation: true,
            max_concurrency: 0,
        }
    }

    fn validate_parameters(
        &self,
        action: Action,
        params: &Map<String, Value>,
    ) -> ParameterValidation {
        if action != Action::HttpRequest {
            return ParameterValidation::failed(vec![format!("unsupported action: {action}")]);
        }
        match self.prepare(params) {
            Ok(_) => ParameterValidation::ok(),
            Err(message) => ParameterValidation::failed(vec![message]),
        }
    }
}
