// crates/responder-store-sqlite/src/lib.rs
// ============================================================================
// Module: Responder SQLite Store Library
// Description: Durable persistence for the Responder engine backed by SQLite.
// Purpose: Implement the core store traits over one embedded database.
// Dependencies: responder-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate implements every persistence trait the engine consumes
//! ([`responder_core::ExecutionStore`], [`responder_core::ApprovalStore`],
//! [`responder_core::AuditStore`], [`responder_core::MetricsStore`], and
//! [`responder_core::AdapterStateStore`]) over a single `SQLite` database.
//! Invariants:
//! - Audit appends chain hashes inside one transaction per entry.
//! - Approval transitions are guarded by `status = 'pending'` updates.
//! - Context snapshot loads verify canonical-JSON hashes and fail closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
