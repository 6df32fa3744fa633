// crates/responder-core/src/core/alert.rs
// ============================================================================
// Module: Responder Alert Model
// Description: Normalized security alert consumed by runbook triggers and templates.
// Purpose: Carry detection context into executions with a stable wire form.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`AlertEvent`] is the normalized form of a detection produced upstream
//! (EDR, SIEM, mail gateway). The engine never interprets detection payloads;
//! it threads the alert into the template namespace `alert.*` and matches its
//! header fields against runbook triggers. Payload shape is vendor-defined
//! and untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Normalized alert severity.
///
/// # Invariants
/// - Variants are stable for serialization and trigger matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational finding.
    Low,
    /// Suspicious activity worth triage.
    Medium,
    /// Likely malicious activity.
    High,
    /// Confirmed or high-impact malicious activity.
    Critical,
}

// ============================================================================
// SECTION: Alert Event
// ============================================================================

/// Normalized security alert.
///
/// # Invariants
/// - `data` is an opaque vendor payload; the engine only threads it through
///   templates and never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Upstream alert identifier.
    pub alert_id: String,
    /// Short human-readable title.
    pub title: String,
    /// Normalized severity.
    pub severity: Severity,
    /// Detection source label (e.g. `edr`, `siem`, `mail`).
    pub source: String,
    /// MITRE ATT&CK technique identifiers attached by the detector.
    pub techniques: Vec<String>,
    /// Platform the detection fired on (e.g. `windows`, `linux`).
    pub platform: Option<String>,
    /// Detection timestamp.
    pub observed_at: Timestamp,
    /// Vendor-defined detection payload (entities, observables, raw fields).
    pub data: Value,
}
