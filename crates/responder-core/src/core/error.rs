// crates/responder-core/src/core/error.rs
// ============================================================================
// Module: Responder Error Taxonomy
// Description: Stable error codes, step failure records, and message hygiene.
// Purpose: Classify failures consistently across adapters, steps, and runs.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every failure that crosses a component boundary carries a stable
//! [`ErrorCode`]. Raw adapter error messages are classified into adapter
//! codes by substring rules, and retryability is derived from the code.
//! Messages that leave the process are sanitized: path-like tokens and
//! source locations are replaced with `[internal]` while codes and the
//! formulated message survive.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable error codes surfaced in results and audit details.
///
/// # Invariants
/// - Wire names are stable SCREAMING_SNAKE_CASE strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Run exceeded its global deadline.
    ExecTimeout,
    /// Run was cancelled externally.
    ExecCancelled,
    /// Runbook failed pre-execution validation.
    ExecValidationFailed,
    /// Illegal state machine transition was attempted.
    ExecStateInvalid,
    /// Adapter call timed out.
    AdapterTimeout,
    /// Adapter could not reach its backend.
    AdapterConnection,
    /// Adapter authentication or authorization failed.
    AdapterAuth,
    /// Adapter was rate limited by its backend.
    AdapterRateLimit,
    /// No adapter is registered under the requested name.
    AdapterNotFound,
    /// Adapter reported an execution failure.
    AdapterExecutionFailed,
    /// Requested runbook does not exist.
    PlaybookNotFound,
    /// Runbook document is structurally invalid.
    PlaybookInvalid,
    /// A runbook step failed.
    PlaybookStepFailed,
    /// Step exceeded its own timeout.
    StepTimeout,
    /// Adapter raised an error during step execution.
    StepExecutionError,
    /// Adapter returned a failure result during step execution.
    StepExecutionFailed,
    /// Approval was not granted within its TTL.
    ApprovalTimeout,
    /// Approval was denied by a human.
    ApprovalDenied,
    /// Approval entry expired before execution.
    ApprovalExpired,
    /// Rollback is not supported by the adapter.
    RollbackNotSupported,
    /// LLM backend unavailable (reserved; LLM paths are not in the engine).
    LlmUnavailable,
    /// LLM call timed out (reserved).
    LlmTimeout,
    /// LLM backend rate limited (reserved).
    LlmRateLimit,
    /// Unclassified internal failure.
    InternalError,
    /// Caller-supplied input was invalid.
    InvalidInput,
}

impl ErrorCode {
    /// Returns the stable wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExecTimeout => "EXEC_TIMEOUT",
            Self::ExecCancelled => "EXEC_CANCELLED",
            Self::ExecValidationFailed => "EXEC_VALIDATION_FAILED",
            Self::ExecStateInvalid => "EXEC_STATE_INVALID",
            Self::AdapterTimeout => "ADAPTER_TIMEOUT",
            Self::AdapterConnection => "ADAPTER_CONNECTION",
            Self::AdapterAuth => "ADAPTER_AUTH",
            Self::AdapterRateLimit => "ADAPTER_RATE_LIMIT",
            Self::AdapterNotFound => "ADAPTER_NOT_FOUND",
            Self::AdapterExecutionFailed => "ADAPTER_EXECUTION_FAILED",
            Self::PlaybookNotFound => "PLAYBOOK_NOT_FOUND",
            Self::PlaybookInvalid => "PLAYBOOK_INVALID",
            Self::PlaybookStepFailed => "PLAYBOOK_STEP_FAILED",
            Self::StepTimeout => "STEP_TIMEOUT",
            Self::StepExecutionError => "STEP_EXECUTION_ERROR",
            Self::StepExecutionFailed => "STEP_EXECUTION_FAILED",
            Self::ApprovalTimeout => "APPROVAL_TIMEOUT",
            Self::ApprovalDenied => "APPROVAL_DENIED",
            Self::ApprovalExpired => "APPROVAL_EXPIRED",
            Self::RollbackNotSupported => "ROLLBACK_NOT_SUPPORTED",
            Self::LlmUnavailable => "LLM_UNAVAILABLE",
            Self::LlmTimeout => "LLM_TIMEOUT",
            Self::LlmRateLimit => "LLM_RATE_LIMIT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidInput => "INVALID_INPUT",
        }
    }

    /// Returns true when a failure with this code may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::AdapterTimeout
                | Self::AdapterConnection
                | Self::AdapterRateLimit
                | Self::LlmTimeout
                | Self::LlmRateLimit
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Step Error
// ============================================================================

/// Failure record attached to a step result.
///
/// # Invariants
/// - `message` is already sanitized for outward exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct StepError {
    /// Stable error code.
    pub code: ErrorCode,
    /// Sanitized human-readable message.
    pub message: String,
    /// Whether the failure is retryable.
    pub retryable: bool,
}

impl StepError {
    /// Builds a step error, sanitizing the message and deriving retryability.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: sanitize_message(&message.into()),
            retryable: code.is_retryable(),
        }
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies a raw adapter error message into an adapter error code.
///
/// Substring rules, checked in order: timeout markers, connection markers,
/// auth markers, rate-limit markers; anything else is `INTERNAL_ERROR`.
#[must_use]
pub fn classify_adapter_message(message: &str) -> ErrorCode {
    let lowered = message.to_lowercase();
    if lowered.contains("timeout") || lowered.contains("etimedout") {
        return ErrorCode::AdapterTimeout;
    }
    if lowered.contains("econnrefused") || lowered.contains("econnreset") {
        return ErrorCode::AdapterConnection;
    }
    if lowered.contains("401") || lowered.contains("unauthorized") || lowered.contains("auth") {
        return ErrorCode::AdapterAuth;
    }
    if lowered.contains("429") || lowered.contains("rate limit") {
        return ErrorCode::AdapterRateLimit;
    }
    ErrorCode::InternalError
}

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Replaces path-like tokens and source locations with `[internal]`.
///
/// Error codes and already-formulated prose survive; anything resembling a
/// filesystem path, a source file reference, or a backtrace frame does not.
#[must_use]
pub fn sanitize_message(message: &str) -> String {
    message
        .split_whitespace()
        .map(|token| {
            if looks_internal(token) {
                "[internal]"
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns true for tokens that expose internals (paths, frames, source refs).
fn looks_internal(token: &str) -> bool {
    let trimmed = token.trim_matches(|ch: char| matches!(ch, '(' | ')' | ',' | ';' | '"' | '\''));
    trimmed.starts_with('/')
        || trimmed.starts_with("\\\\")
        || trimmed.contains(".rs:")
        || trimmed.ends_with(".rs")
        || trimmed.starts_with("at ")
        || (trimmed.contains('\\') && trimmed.contains(':'))
}
