// crates/responder-core/tests/proptest_template.rs
// ============================================================================
// Module: Template Resolver Property Tests
// Description: Property-based checks for resolution determinism and safety.
// Purpose: Validate that arbitrary inputs never panic and resolve stably.
// ============================================================================

//! ## Overview
//! Property suites for the template resolver and the error sanitizer:
//! - Resolution is deterministic for a fixed context
//! - Strings without delimiters pass through unchanged
//! - Sanitized messages never leak path-like tokens

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::proptest;
use responder_core::TemplateContext;
use responder_core::resolve_value;
use responder_core::sanitize_message;
use serde_json::json;

proptest! {
    #[test]
    fn resolution_is_deterministic(input in ".{0,64}") {
        let template = TemplateContext::default();
        let first = resolve_value(&json!(input.clone()), &template);
        let second = resolve_value(&json!(input), &template);
        assert_eq!(first, second);
    }

    #[test]
    fn plain_strings_pass_through_unchanged(input in "[^{}]{0,64}") {
        let template = TemplateContext::default();
        let resolved = resolve_value(&json!(input.clone()), &template);
        assert_eq!(resolved, json!(input));
    }

    #[test]
    fn sanitized_messages_never_leak_absolute_paths(
        prefix in "[a-z ]{0,16}",
        path in "/[a-z]{1,8}/[a-z]{1,8}\\.rs",
    ) {
        let message = format!("{prefix} failed at {path}");
        let sanitized = sanitize_message(&message);
        assert!(!sanitized.contains(&path));
        assert!(sanitized.contains("[internal]"));
    }
}
