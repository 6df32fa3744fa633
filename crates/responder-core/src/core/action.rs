// crates/responder-core/src/core/action.rs
// ============================================================================
// Module: Responder Action Catalog
// Description: The enumerated remediation action symbols and their read/write partition.
// Purpose: Give the scheduler a total, compiler-checked classification of every action.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every runbook step names exactly one action from this catalog. Actions are
//! partitioned into read actions (no external state change) and write actions
//! (everything else); the partition is total and disjoint by construction
//! because [`Action::kind`] matches exhaustively. The scheduler uses the
//! partition to decide approval gating and rollback semantics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Action Kind
// ============================================================================

/// Read/write classification of an action.
///
/// # Invariants
/// - Every action maps to exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Action observes external systems without changing their state.
    Read,
    /// Action mutates external system state.
    Write,
}

// ============================================================================
// SECTION: Action Catalog
// ============================================================================

/// Canonical remediation action symbols.
///
/// # Invariants
/// - Wire names are stable snake_case strings.
/// - The catalog is closed; adapters declare support for subsets of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Collect log records from a log source.
    CollectLogs,
    /// Run a query against the SIEM.
    QuerySiem,
    /// Capture network traffic for a host or segment.
    CollectNetworkTraffic,
    /// Capture a memory snapshot from a host.
    SnapshotMemory,
    /// Collect metadata for a file without touching its content.
    CollectFileMetadata,
    /// Enrich an indicator of compromise via enrichment services.
    EnrichIoc,
    /// Check the reputation of an indicator.
    CheckReputation,
    /// Query a threat intelligence feed.
    QueryThreatFeed,
    /// Retrieve telemetry from the EDR platform.
    RetrieveEdrData,
    /// Compute a cryptographic hash of an artifact.
    CalculateHash,
    /// Issue an arbitrary HTTP request to an allowed endpoint.
    HttpRequest,
    /// Pause for a configured interval.
    Wait,
    /// Isolate a host from the network.
    IsolateHost,
    /// Restore network connectivity for a previously isolated host.
    RestoreConnectivity,
    /// Block an IP address at the firewall.
    BlockIp,
    /// Remove an IP block at the firewall.
    UnblockIp,
    /// Block a domain at DNS or proxy.
    BlockDomain,
    /// Remove a domain block.
    UnblockDomain,
    /// Disable a user account in the identity provider.
    DisableAccount,
    /// Re-enable a user account.
    EnableAccount,
    /// Force a password reset for a user account.
    ResetPassword,
    /// Revoke all active sessions for a user account.
    RevokeSessions,
    /// Quarantine a file on an endpoint.
    QuarantineFile,
    /// Restore a previously quarantined file.
    RestoreFile,
    /// Terminate a process on an endpoint.
    KillProcess,
    /// Start an on-demand EDR scan.
    StartEdrScan,
    /// Delete a malicious email from mailboxes.
    DeleteEmail,
    /// Create a tracking ticket.
    CreateTicket,
    /// Update an existing tracking ticket.
    UpdateTicket,
    /// Close a tracking ticket.
    CloseTicket,
    /// Send an email notification.
    NotifyEmail,
    /// Send a Slack notification.
    NotifySlack,
    /// Deliver a notification to a webhook.
    NotifyWebhook,
}

impl Action {
    /// All actions in catalog order.
    pub const ALL: [Self; 33] = [
        Self::CollectLogs,
        Self::QuerySiem,
        Self::CollectNetworkTraffic,
        Self::SnapshotMemory,
        Self::CollectFileMetadata,
        Self::EnrichIoc,
        Self::CheckReputation,
        Self::QueryThreatFeed,
        Self::RetrieveEdrData,
        Self::CalculateHash,
        Self::HttpRequest,
        Self::Wait,
        Self::IsolateHost,
        Self::RestoreConnectivity,
        Self::BlockIp,
        Self::UnblockIp,
        Self::BlockDomain,
        Self::UnblockDomain,
        Self::DisableAccount,
        Self::EnableAccount,
        Self::ResetPassword,
        Self::RevokeSessions,
        Self::QuarantineFile,
        Self::RestoreFile,
        Self::KillProcess,
        Self::StartEdrScan,
        Self::DeleteEmail,
        Self::CreateTicket,
        Self::UpdateTicket,
        Self::CloseTicket,
        Self::NotifyEmail,
        Self::NotifySlack,
        Self::NotifyWebhook,
    ];

    /// Classifies the action as read or write.
    #[must_use]
    pub const fn kind(self) -> ActionKind {
        match self {
            Self::CollectLogs
            | Self::QuerySiem
            | Self::CollectNetworkTraffic
            | Self::SnapshotMemory
            | Self::CollectFileMetadata
            | Self::EnrichIoc
            | Self::CheckReputation
            | Self::QueryThreatFeed
            | Self::RetrieveEdrData
            | Self::CalculateHash
            | Self::HttpRequest
            | Self::Wait => ActionKind::Read,
            Self::IsolateHost
            | Self::RestoreConnectivity
            | Self::BlockIp
            | Self::UnblockIp
            | Self::BlockDomain
            | Self::UnblockDomain
            | Self::DisableAccount
            | Self::EnableAccount
            | Self::ResetPassword
            | Self::RevokeSessions
            | Self::QuarantineFile
            | Self::RestoreFile
            | Self::KillProcess
            | Self::StartEdrScan
            | Self::DeleteEmail
            | Self::CreateTicket
            | Self::UpdateTicket
            | Self::CloseTicket
            | Self::NotifyEmail
            | Self::NotifySlack
            | Self::NotifyWebhook => ActionKind::Write,
        }
    }

    /// Returns true when the action mutates external state.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self.kind(), ActionKind::Write)
    }

    /// Returns the stable snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CollectLogs => "collect_logs",
            Self::QuerySiem => "query_siem",
            Self::CollectNetworkTraffic => "collect_network_traffic",
            Self::SnapshotMemory => "snapshot_memory",
            Self::CollectFileMetadata => "collect_file_metadata",
            Self::EnrichIoc => "enrich_ioc",
            Self::CheckReputation => "check_reputation",
            Self::QueryThreatFeed => "query_threat_feed",
            Self::RetrieveEdrData => "retrieve_edr_data",
            Self::CalculateHash => "calculate_hash",
            Self::HttpRequest => "http_request",
            Self::Wait => "wait",
            Self::IsolateHost => "isolate_host",
            Self::RestoreConnectivity => "restore_connectivity",
            Self::BlockIp => "block_ip",
            Self::UnblockIp => "unblock_ip",
            Self::BlockDomain => "block_domain",
            Self::UnblockDomain => "unblock_domain",
            Self::DisableAccount => "disable_account",
            Self::EnableAccount => "enable_account",
            Self::ResetPassword => "reset_password",
            Self::RevokeSessions => "revoke_sessions",
            Self::QuarantineFile => "quarantine_file",
            Self::RestoreFile => "restore_file",
            Self::KillProcess => "kill_process",
            Self::StartEdrScan => "start_edr_scan",
            Self::DeleteEmail => "delete_email",
            Self::CreateTicket => "create_ticket",
            Self::UpdateTicket => "update_ticket",
            Self::CloseTicket => "close_ticket",
            Self::NotifyEmail => "notify_email",
            Self::NotifySlack => "notify_slack",
            Self::NotifyWebhook => "notify_webhook",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
