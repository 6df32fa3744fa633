// crates/responder-core/src/core/approval.rs
// ============================================================================
// Module: Responder Approval Model
// Description: Approval queue entries and their lifecycle states.
// Purpose: Persist the human gate for one L2 write action with frozen payloads.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! An approval queue entry records exactly what a human is asked to approve:
//! the action, its fully resolved parameters, and the simulation report, all
//! frozen as canonical JSON at enqueue time. Approval is semantically
//! "approve exactly this payload"; execution after approval parses the frozen
//! bytes and never re-resolves templates. Status transitions follow
//! `pending -> approved | denied | expired` and terminal states are sticky.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::action::Action;
use crate::core::identifiers::AdapterName;
use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::RunbookId;
use crate::core::identifiers::StepId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Approval Status
// ============================================================================

/// Lifecycle status of an approval queue entry.
///
/// # Invariants
/// - Transitions only leave `Pending`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a human decision.
    Pending,
    /// Approved by a human before expiry.
    Approved,
    /// Denied by a human.
    Denied,
    /// TTL elapsed before a decision.
    Expired,
}

impl ApprovalStatus {
    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns the stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
        }
    }

    /// Parses the stable wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Approval Queue Entry
// ============================================================================

/// Persisted record of one pending human gate.
///
/// # Invariants
/// - `parameters_json` and `simulation_json` are canonical JSON frozen at
///   enqueue time and never re-serialized on read.
/// - `expires_at = requested_at + ttl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalQueueEntry {
    /// Approval request identifier.
    pub request_id: RequestId,
    /// Execution awaiting this approval.
    pub execution_id: ExecutionId,
    /// Runbook identifier.
    pub runbook_id: RunbookId,
    /// Runbook name shown to approvers.
    pub runbook_name: String,
    /// Gated step identifier.
    pub step_id: StepId,
    /// Gated step name shown to approvers.
    pub step_name: String,
    /// Gated action.
    pub action: Action,
    /// Adapter that must serve the approved action.
    pub executor: AdapterName,
    /// Frozen canonical JSON of the fully resolved parameters.
    pub parameters_json: String,
    /// Frozen canonical JSON of the simulation report.
    pub simulation_json: String,
    /// Lifecycle status.
    pub status: ApprovalStatus,
    /// Enqueue time.
    pub requested_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
    /// Approver identity, once approved.
    pub approved_by: Option<String>,
    /// Approval time, once approved.
    pub approved_at: Option<Timestamp>,
    /// Denial reason, once denied.
    pub denial_reason: Option<String>,
}

impl ApprovalQueueEntry {
    /// Returns true when `now` is at or past the entry's expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        now >= &self.expires_at
    }
}
