// crates/responder-adapters/src/lib.rs
// ============================================================================
// Module: Responder Adapters Library
// Description: Adapter registry and built-in adapters for the Responder engine.
// Purpose: Provide dispatch routing plus policy-guarded built-in integrations.
// Dependencies: responder-core, reqwest, tokio, url
// ============================================================================

//! ## Overview
//! This crate ships the adapter registry the scheduler dispatches through
//! and two built-in adapters: `http` (read-only, host-policy guarded) and
//! `scripted` (deterministic fixtures for rehearsals and tests). Vendor
//! adapters implement [`responder_core::Adapter`] in their own crates and
//! register here at composition time.
//! Invariants:
//! - Adapter names are unique within a registry.
//! - The action reverse index is invalidated atomically with registration.
//!
//! Security posture: adapter inputs and backend responses are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod registry;
pub mod scripted;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpAdapter;
pub use http::HttpAdapterConfig;
pub use http::HttpHostPolicy;
pub use registry::AdapterRegistration;
pub use registry::AdapterRegistry;
pub use registry::AdapterResolver;
pub use registry::RegistryError;
pub use scripted::RecordedCall;
pub use scripted::ScriptedAdapter;
pub use scripted::ScriptedOutcome;
