// crates/responder-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Responder Store
// Description: Durable store for executions, step results, approvals, audit, and metrics.
// Purpose: Persist engine state with short transactions and fail-closed integrity checks.
// Dependencies: responder-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! One SQLite database backs every store trait the engine consumes. Writes
//! run in short transactions on a mutex-guarded connection: the audit append
//! performs its previous-hash lookup and insert in one transaction so chains
//! cannot interleave, and approval transitions are serialized by a
//! `status = 'pending'` guard so at most one transition wins. Context
//! snapshots are stored with a canonical-JSON hash and verified on load.
//!
//! Security posture: database contents are untrusted on load; integrity
//! checks fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use responder_core::Action;
use responder_core::AdapterName;
use responder_core::AdapterRow;
use responder_core::AdapterStateStore;
use responder_core::ApprovalError;
use responder_core::ApprovalQueueEntry;
use responder_core::ApprovalStatus;
use responder_core::ApprovalStore;
use responder_core::AuditEntry;
use responder_core::AuditEventType;
use responder_core::AuditStore;
use responder_core::ExecutionContext;
use responder_core::ExecutionId;
use responder_core::ExecutionMode;
use responder_core::ExecutionRecord;
use responder_core::ExecutionResult;
use responder_core::ExecutionState;
use responder_core::ExecutionStore;
use responder_core::HealthState;
use responder_core::MetricSample;
use responder_core::MetricsStore;
use responder_core::NewAuditEntry;
use responder_core::RequestId;
use responder_core::Runbook;
use responder_core::RunbookId;
use responder_core::StepError;
use responder_core::StepId;
use responder_core::StepResult;
use responder_core::StoreError;
use responder_core::Timestamp;
use responder_core::hashing::DEFAULT_HASH_ALGORITHM;
use responder_core::hashing::audit_entry_hash;
use responder_core::hashing::canonical_json_bytes;
use responder_core::hashing::hash_bytes;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQLite schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for the given path.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw payloads.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

/// Maps a rusqlite error to a store db error.
fn db_err(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed store for every engine persistence trait.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Snapshot loads verify stored hashes before deserialization.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens an `SQLite`-backed store, creating the schema when missing.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let mut connection =
            Connection::open(&config.path).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        apply_pragmas(&connection, config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Opens an in-memory store (tests and rehearsals).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let mut connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|err| db_err(&err))?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Runs a closure against the raw connection.
    ///
    /// Escape hatch for diagnostics and test fixtures; normal access goes
    /// through the store traits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the closure reports a database error.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, SqliteStoreError> {
        let connection = self.lock();
        f(&connection).map_err(|err| db_err(&err))
    }

    /// Acquires the connection, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates the parent directory of the database path when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    }
    Ok(())
}

/// Applies connection pragmas from the configuration.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_err(&err))?;
    Ok(())
}

/// Creates or validates the store schema.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS executions (
                    execution_id TEXT NOT NULL PRIMARY KEY,
                    runbook_id TEXT NOT NULL,
                    runbook_version TEXT NOT NULL,
                    runbook_name TEXT NOT NULL,
                    runbook_json TEXT NOT NULL,
                    state TEXT NOT NULL,
                    mode TEXT NOT NULL,
                    context_snapshot BLOB,
                    snapshot_hash TEXT,
                    error TEXT,
                    started_at INTEGER NOT NULL,
                    completed_at INTEGER,
                    duration_ms INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_executions_started_at
                    ON executions (started_at DESC);
                CREATE TABLE IF NOT EXISTS step_results (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    execution_id TEXT NOT NULL
                        REFERENCES executions(execution_id) ON DELETE CASCADE,
                    step_id TEXT NOT NULL,
                    step_name TEXT NOT NULL,
                    action TEXT NOT NULL,
                    success INTEGER NOT NULL,
                    skipped INTEGER NOT NULL,
                    output TEXT,
                    error TEXT,
                    rolled_back INTEGER NOT NULL,
                    started_at INTEGER NOT NULL,
                    completed_at INTEGER NOT NULL,
                    duration_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_step_results_execution
                    ON step_results (execution_id);
                CREATE TABLE IF NOT EXISTS approval_queue (
                    request_id TEXT NOT NULL PRIMARY KEY,
                    execution_id TEXT NOT NULL
                        REFERENCES executions(execution_id),
                    runbook_id TEXT NOT NULL,
                    runbook_name TEXT NOT NULL,
                    step_id TEXT NOT NULL,
                    step_name TEXT NOT NULL,
                    action TEXT NOT NULL,
                    executor TEXT NOT NULL,
                    parameters TEXT NOT NULL,
                    simulation_result TEXT NOT NULL,
                    status TEXT NOT NULL,
                    requested_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    approved_by TEXT,
                    approved_at INTEGER,
                    denial_reason TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_approval_queue_status
                    ON approval_queue (status);
                CREATE INDEX IF NOT EXISTS idx_approval_queue_expires_at
                    ON approval_queue (expires_at);
                CREATE TABLE IF NOT EXISTS audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp INTEGER NOT NULL,
                    execution_id TEXT NOT NULL
                        REFERENCES executions(execution_id),
                    runbook_id TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    actor TEXT NOT NULL,
                    details TEXT NOT NULL,
                    success INTEGER NOT NULL,
                    prev_hash TEXT NOT NULL,
                    hash TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp
                    ON audit_log (timestamp DESC);
                CREATE INDEX IF NOT EXISTS idx_audit_log_execution
                    ON audit_log (execution_id, id);
                CREATE TABLE IF NOT EXISTS metrics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    period_start INTEGER NOT NULL,
                    period_end INTEGER NOT NULL,
                    metric_name TEXT NOT NULL,
                    metric_value REAL NOT NULL,
                    dimensions TEXT NOT NULL,
                    UNIQUE (period_start, period_end, metric_name, dimensions)
                );
                CREATE TABLE IF NOT EXISTS adapters (
                    name TEXT NOT NULL PRIMARY KEY,
                    type TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    config TEXT NOT NULL,
                    health_status TEXT,
                    last_health_check INTEGER
                );",
            )
            .map_err(|err| db_err(&err))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit().map_err(|err| db_err(&err))
}

// ============================================================================
// SECTION: Row Mapping Helpers
// ============================================================================

/// Parses a serde string-enum from its stored text form.
fn enum_from_text<T: DeserializeOwned>(column: &str, text: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_value(Value::from(text))
        .map_err(|_| SqliteStoreError::Invalid(format!("unknown {column} value: {text}")))
}

/// Renders a serde string-enum to its stored text form.
fn enum_to_text<T: Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    match serde_json::to_value(value) {
        Ok(Value::String(text)) => Ok(text),
        _ => Err(SqliteStoreError::Invalid("enum did not serialize to a string".to_string())),
    }
}

/// Parses a stored unix-millis column into a timestamp.
fn timestamp_from_millis(column: &str, millis: i64) -> Result<Timestamp, SqliteStoreError> {
    Timestamp::from_unix_millis(millis)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("invalid {column} value: {millis}")))
}

/// Parses a stored execution identifier.
fn execution_id_from_text(text: &str) -> Result<ExecutionId, SqliteStoreError> {
    ExecutionId::parse(text)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("invalid execution_id: {text}")))
}

/// Parses a stored request identifier.
fn request_id_from_text(text: &str) -> Result<RequestId, SqliteStoreError> {
    RequestId::parse(text)
        .ok_or_else(|| SqliteStoreError::Invalid(format!("invalid request_id: {text}")))
}

/// Maps one `executions` row into a record.
fn execution_record_from_row(row: &Row<'_>) -> rusqlite::Result<RawExecutionRow> {
    Ok(RawExecutionRow {
        execution_id: row.get(0)?,
        runbook_id: row.get(1)?,
        runbook_version: row.get(2)?,
        runbook_name: row.get(3)?,
        state: row.get(4)?,
        mode: row.get(5)?,
        error: row.get(6)?,
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        duration_ms: row.get(9)?,
    })
}

/// Raw `executions` row before typed conversion.
struct RawExecutionRow {
    /// Execution identifier text.
    execution_id: String,
    /// Runbook identifier text.
    runbook_id: String,
    /// Runbook version text.
    runbook_version: String,
    /// Runbook name text.
    runbook_name: String,
    /// State text.
    state: String,
    /// Mode text.
    mode: String,
    /// Optional error text.
    error: Option<String>,
    /// Start time in unix millis.
    started_at: i64,
    /// Optional completion time in unix millis.
    completed_at: Option<i64>,
    /// Optional duration in milliseconds.
    duration_ms: Option<i64>,
}

impl RawExecutionRow {
    /// Converts the raw row into a typed record.
    fn into_record(self) -> Result<ExecutionRecord, SqliteStoreError> {
        let state: ExecutionState = enum_from_text("state", &self.state)?;
        let mode: ExecutionMode = enum_from_text("mode", &self.mode)?;
        let completed_at = self
            .completed_at
            .map(|millis| timestamp_from_millis("completed_at", millis))
            .transpose()?;
        Ok(ExecutionRecord {
            execution_id: execution_id_from_text(&self.execution_id)?,
            runbook_id: RunbookId::new(self.runbook_id),
            runbook_version: self.runbook_version,
            runbook_name: self.runbook_name,
            state,
            mode,
            error: self.error,
            started_at: timestamp_from_millis("started_at", self.started_at)?,
            completed_at,
            duration_ms: self.duration_ms.and_then(|value| u64::try_from(value).ok()),
        })
    }
}

/// Raw `approval_queue` row before typed conversion.
struct RawApprovalRow {
    /// Request identifier text.
    request_id: String,
    /// Execution identifier text.
    execution_id: String,
    /// Runbook identifier text.
    runbook_id: String,
    /// Runbook name text.
    runbook_name: String,
    /// Step identifier text.
    step_id: String,
    /// Step name text.
    step_name: String,
    /// Action text.
    action: String,
    /// Executor adapter name text.
    executor: String,
    /// Frozen parameters JSON.
    parameters: String,
    /// Frozen simulation JSON.
    simulation_result: String,
    /// Status text.
    status: String,
    /// Request time in unix millis.
    requested_at: i64,
    /// Expiry time in unix millis.
    expires_at: i64,
    /// Optional approver.
    approved_by: Option<String>,
    /// Optional approval time in unix millis.
    approved_at: Option<i64>,
    /// Optional denial reason.
    denial_reason: Option<String>,
}

/// Maps one `approval_queue` row into its raw form.
fn approval_from_row(row: &Row<'_>) -> rusqlite::Result<RawApprovalRow> {
    Ok(RawApprovalRow {
        request_id: row.get(0)?,
        execution_id: row.get(1)?,
        runbook_id: row.get(2)?,
        runbook_name: row.get(3)?,
        step_id: row.get(4)?,
        step_name: row.get(5)?,
        action: row.get(6)?,
        executor: row.get(7)?,
        parameters: row.get(8)?,
        simulation_result: row.get(9)?,
        status: row.get(10)?,
        requested_at: row.get(11)?,
        expires_at: row.get(12)?,
        approved_by: row.get(13)?,
        approved_at: row.get(14)?,
        denial_reason: row.get(15)?,
    })
}

/// Column list shared by approval reads.
const APPROVAL_COLUMNS: &str = "request_id, execution_id, runbook_id, runbook_name, step_id, \
                                step_name, action, executor, parameters, simulation_result, \
                                status, requested_at, expires_at, approved_by, approved_at, \
                                denial_reason";

impl RawApprovalRow {
    /// Converts the raw row into a typed entry.
    fn into_entry(self) -> Result<ApprovalQueueEntry, SqliteStoreError> {
        let action: Action = enum_from_text("action", &self.action)?;
        let status = ApprovalStatus::parse(&self.status)
            .ok_or_else(|| SqliteStoreError::Invalid(format!("unknown status: {}", self.status)))?;
        let approved_at = self
            .approved_at
            .map(|millis| timestamp_from_millis("approved_at", millis))
            .transpose()?;
        Ok(ApprovalQueueEntry {
            request_id: request_id_from_text(&self.request_id)?,
            execution_id: execution_id_from_text(&self.execution_id)?,
            runbook_id: RunbookId::new(self.runbook_id),
            runbook_name: self.runbook_name,
            step_id: StepId::new(self.step_id),
            step_name: self.step_name,
            action,
            executor: AdapterName::new(self.executor),
            parameters_json: self.parameters,
            simulation_json: self.simulation_result,
            status,
            requested_at: timestamp_from_millis("requested_at", self.requested_at)?,
            expires_at: timestamp_from_millis("expires_at", self.expires_at)?,
            approved_by: self.approved_by,
            approved_at,
            denial_reason: self.denial_reason,
        })
    }
}

// ============================================================================
// SECTION: Execution Store Implementation
// ============================================================================

impl ExecutionStore for SqliteStore {
    fn create_execution(
        &self,
        context: &ExecutionContext,
        runbook: &Runbook,
    ) -> Result<(), StoreError> {
        let state = enum_to_text(&context.state).map_err(StoreError::from)?;
        let mode = enum_to_text(&context.mode).map_err(StoreError::from)?;
        let runbook_json =
            serde_json::to_string(runbook).map_err(|err| StoreError::Invalid(err.to_string()))?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO executions (execution_id, runbook_id, runbook_version, \
                 runbook_name, runbook_json, state, mode, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    context.execution_id.to_string(),
                    context.runbook_id.as_str(),
                    context.runbook_version,
                    runbook.name,
                    runbook_json,
                    state,
                    mode,
                    context.started_at.unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(())
    }

    fn load_runbook(&self, execution_id: ExecutionId) -> Result<Option<Runbook>, StoreError> {
        let connection = self.lock();
        let text: Option<String> = connection
            .query_row(
                "SELECT runbook_json FROM executions WHERE execution_id = ?1",
                params![execution_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        text.map(|raw| {
            serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt(err.to_string()))
        })
        .transpose()
    }

    fn update_execution_state(
        &self,
        execution_id: ExecutionId,
        state: ExecutionState,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let state = enum_to_text(&state).map_err(StoreError::from)?;
        let connection = self.lock();
        let changed = connection
            .execute(
                "UPDATE executions SET state = ?1, error = COALESCE(?2, error)
                 WHERE execution_id = ?3",
                params![state, error, execution_id.to_string()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(execution_id.to_string()));
        }
        Ok(())
    }

    fn save_context_snapshot(
        &self,
        execution_id: ExecutionId,
        snapshot: &Value,
    ) -> Result<(), StoreError> {
        let bytes = canonical_json_bytes(snapshot)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        let connection = self.lock();
        let changed = connection
            .execute(
                "UPDATE executions SET context_snapshot = ?1, snapshot_hash = ?2
                 WHERE execution_id = ?3",
                params![bytes, digest.value, execution_id.to_string()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(execution_id.to_string()));
        }
        Ok(())
    }

    fn load_context_snapshot(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<Value>, StoreError> {
        let connection = self.lock();
        let row: Option<(Option<Vec<u8>>, Option<String>)> = connection
            .query_row(
                "SELECT context_snapshot, snapshot_hash FROM executions WHERE execution_id = ?1",
                params![execution_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let Some((Some(bytes), Some(stored_hash))) = row else {
            return Ok(None);
        };
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        if digest.value != stored_hash {
            return Err(StoreError::Corrupt(format!(
                "context snapshot hash mismatch for {execution_id}"
            )));
        }
        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(snapshot))
    }

    fn finalize_execution(&self, result: &ExecutionResult) -> Result<(), StoreError> {
        let state = enum_to_text(&result.state).map_err(StoreError::from)?;
        let duration = i64::try_from(result.duration_ms).unwrap_or(i64::MAX);
        let connection = self.lock();
        let changed = connection
            .execute(
                "UPDATE executions SET state = ?1, error = ?2, completed_at = ?3, \
                 duration_ms = ?4
                 WHERE execution_id = ?5",
                params![
                    state,
                    result.error,
                    result.completed_at.unix_millis(),
                    duration,
                    result.execution_id.to_string(),
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(result.execution_id.to_string()));
        }
        Ok(())
    }

    fn insert_step_result(
        &self,
        execution_id: ExecutionId,
        result: &StepResult,
    ) -> Result<(), StoreError> {
        let action = enum_to_text(&result.action).map_err(StoreError::from)?;
        let output = result
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let error = result
            .error
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let duration = i64::try_from(result.duration_ms).unwrap_or(i64::MAX);
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO step_results (execution_id, step_id, step_name, action, success, \
                 skipped, output, error, rolled_back, started_at, completed_at, duration_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    execution_id.to_string(),
                    result.step_id.as_str(),
                    result.step_name,
                    action,
                    i64::from(result.success),
                    i64::from(result.skipped),
                    output,
                    error,
                    i64::from(result.rolled_back),
                    result.started_at.unix_millis(),
                    result.completed_at.unix_millis(),
                    duration,
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(())
    }

    fn mark_step_rolled_back(
        &self,
        execution_id: ExecutionId,
        step_id: &StepId,
    ) -> Result<(), StoreError> {
        let connection = self.lock();
        let changed = connection
            .execute(
                "UPDATE step_results SET rolled_back = 1
                 WHERE execution_id = ?1 AND step_id = ?2",
                params![execution_id.to_string(), step_id.as_str()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("{execution_id}/{step_id}")));
        }
        Ok(())
    }

    fn get_execution(
        &self,
        execution_id: ExecutionId,
    ) -> Result<Option<ExecutionRecord>, StoreError> {
        let connection = self.lock();
        let raw = connection
            .query_row(
                "SELECT execution_id, runbook_id, runbook_version, runbook_name, state, mode, \
                 error, started_at, completed_at, duration_ms
                 FROM executions WHERE execution_id = ?1",
                params![execution_id.to_string()],
                execution_record_from_row,
            )
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        raw.map(|row| row.into_record().map_err(StoreError::from)).transpose()
    }

    fn list_recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>, StoreError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT execution_id, runbook_id, runbook_version, runbook_name, state, mode, \
                 error, started_at, completed_at, duration_ms
                 FROM executions ORDER BY started_at DESC, execution_id LIMIT ?1",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement
            .query_map(params![limit], execution_record_from_row)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| StoreError::Db(err.to_string()))?;
            records.push(raw.into_record().map_err(StoreError::from)?);
        }
        Ok(records)
    }

    fn list_step_results(&self, execution_id: ExecutionId) -> Result<Vec<StepResult>, StoreError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT step_id, step_name, action, success, skipped, output, error, \
                 rolled_back, started_at, completed_at, duration_ms
                 FROM step_results WHERE execution_id = ?1 ORDER BY id",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![execution_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, i64>(8)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            })
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut results = Vec::new();
        for row in rows {
            let (
                step_id,
                step_name,
                action,
                success,
                skipped,
                output,
                error,
                rolled_back,
                started_at,
                completed_at,
                duration_ms,
            ) = row.map_err(|err| StoreError::Db(err.to_string()))?;
            let action: Action = enum_from_text("action", &action).map_err(StoreError::from)?;
            let output: Option<Value> = output
                .map(|text| serde_json::from_str(&text))
                .transpose()
                .map_err(|err| StoreError::Invalid(err.to_string()))?;
            let error: Option<StepError> = error
                .map(|text| serde_json::from_str(&text))
                .transpose()
                .map_err(|err| StoreError::Invalid(err.to_string()))?;
            results.push(StepResult {
                step_id: StepId::new(step_id),
                step_name,
                action,
                success: success != 0,
                skipped: skipped != 0,
                started_at: timestamp_from_millis("started_at", started_at)
                    .map_err(StoreError::from)?,
                completed_at: timestamp_from_millis("completed_at", completed_at)
                    .map_err(StoreError::from)?,
                duration_ms: u64::try_from(duration_ms).unwrap_or(0),
                output,
                error,
                rolled_back: rolled_back != 0,
            });
        }
        Ok(results)
    }
}

// ============================================================================
// SECTION: Approval Store Implementation
// ============================================================================

impl ApprovalStore for SqliteStore {
    fn insert_approval(&self, entry: &ApprovalQueueEntry) -> Result<(), StoreError> {
        let action = enum_to_text(&entry.action).map_err(StoreError::from)?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO approval_queue (request_id, execution_id, runbook_id, \
                 runbook_name, step_id, step_name, action, executor, parameters, \
                 simulation_result, status, requested_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    entry.request_id.to_string(),
                    entry.execution_id.to_string(),
                    entry.runbook_id.as_str(),
                    entry.runbook_name,
                    entry.step_id.as_str(),
                    entry.step_name,
                    action,
                    entry.executor.as_str(),
                    entry.parameters_json,
                    entry.simulation_json,
                    entry.status.as_str(),
                    entry.requested_at.unix_millis(),
                    entry.expires_at.unix_millis(),
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(())
    }

    fn approve(
        &self,
        request_id: RequestId,
        approver: &str,
        now: Timestamp,
    ) -> Result<ApprovalQueueEntry, ApprovalError> {
        let mut guard = self.lock();
        let tx = guard.transaction().map_err(|err| StoreError::Db(err.to_string()))?;
        let entry = load_approval_tx(&tx, request_id)?
            .ok_or(ApprovalError::NotFound(request_id))?;
        if entry.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending {
                request_id,
                status: entry.status,
            });
        }
        if entry.is_expired_at(&now) {
            tx.execute(
                "UPDATE approval_queue SET status = 'expired'
                 WHERE request_id = ?1 AND status = 'pending'",
                params![request_id.to_string()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
            tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
            return Err(ApprovalError::Expired(request_id));
        }
        let changed = tx
            .execute(
                "UPDATE approval_queue SET status = 'approved', approved_by = ?1, \
                 approved_at = ?2
                 WHERE request_id = ?3 AND status = 'pending'",
                params![approver, now.unix_millis(), request_id.to_string()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            let current = load_approval_tx(&tx, request_id)?
                .ok_or(ApprovalError::NotFound(request_id))?;
            return Err(ApprovalError::NotPending {
                request_id,
                status: current.status,
            });
        }
        let updated = load_approval_tx(&tx, request_id)?
            .ok_or(ApprovalError::NotFound(request_id))?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(updated)
    }

    fn deny(
        &self,
        request_id: RequestId,
        reason: &str,
        now: Timestamp,
    ) -> Result<ApprovalQueueEntry, ApprovalError> {
        let _ = now;
        let mut guard = self.lock();
        let tx = guard.transaction().map_err(|err| StoreError::Db(err.to_string()))?;
        let entry = load_approval_tx(&tx, request_id)?
            .ok_or(ApprovalError::NotFound(request_id))?;
        if entry.status != ApprovalStatus::Pending {
            return Err(ApprovalError::NotPending {
                request_id,
                status: entry.status,
            });
        }
        let changed = tx
            .execute(
                "UPDATE approval_queue SET status = 'denied', denial_reason = ?1
                 WHERE request_id = ?2 AND status = 'pending'",
                params![reason, request_id.to_string()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            let current = load_approval_tx(&tx, request_id)?
                .ok_or(ApprovalError::NotFound(request_id))?;
            return Err(ApprovalError::NotPending {
                request_id,
                status: current.status,
            });
        }
        let updated = load_approval_tx(&tx, request_id)?
            .ok_or(ApprovalError::NotFound(request_id))?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(updated)
    }

    fn expire_stale(&self, now: Timestamp) -> Result<u64, StoreError> {
        let connection = self.lock();
        let changed = connection
            .execute(
                "UPDATE approval_queue SET status = 'expired'
                 WHERE status = 'pending' AND expires_at <= ?1",
                params![now.unix_millis()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }

    fn get_approval(
        &self,
        request_id: RequestId,
    ) -> Result<Option<ApprovalQueueEntry>, StoreError> {
        let connection = self.lock();
        let raw = connection
            .query_row(
                &format!(
                    "SELECT {APPROVAL_COLUMNS} FROM approval_queue WHERE request_id = ?1"
                ),
                params![request_id.to_string()],
                approval_from_row,
            )
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        raw.map(|row| row.into_entry().map_err(StoreError::from)).transpose()
    }

    fn list_by_status(
        &self,
        status: ApprovalStatus,
        limit: usize,
    ) -> Result<Vec<ApprovalQueueEntry>, StoreError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(&format!(
                "SELECT {APPROVAL_COLUMNS} FROM approval_queue
                 WHERE status = ?1 ORDER BY requested_at, request_id LIMIT ?2"
            ))
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = statement
            .query_map(params![status.as_str(), limit], approval_from_row)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| StoreError::Db(err.to_string()))?;
            entries.push(raw.into_entry().map_err(StoreError::from)?);
        }
        Ok(entries)
    }
}

/// Loads one approval row inside a transaction.
fn load_approval_tx(
    tx: &Transaction<'_>,
    request_id: RequestId,
) -> Result<Option<ApprovalQueueEntry>, ApprovalError> {
    let raw = tx
        .query_row(
            &format!("SELECT {APPROVAL_COLUMNS} FROM approval_queue WHERE request_id = ?1"),
            params![request_id.to_string()],
            approval_from_row,
        )
        .optional()
        .map_err(|err| ApprovalError::Store(StoreError::Db(err.to_string())))?;
    raw.map(|row| row.into_entry().map_err(|err| ApprovalError::Store(StoreError::from(err))))
        .transpose()
}

// ============================================================================
// SECTION: Audit Store Implementation
// ============================================================================

impl AuditStore for SqliteStore {
    fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let mut guard = self.lock();
        let tx = guard.transaction().map_err(|err| StoreError::Db(err.to_string()))?;
        let prev_hash: String = tx
            .query_row(
                "SELECT hash FROM audit_log WHERE execution_id = ?1 ORDER BY id DESC LIMIT 1",
                params![entry.execution_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?
            .unwrap_or_default();
        let hash = audit_entry_hash(
            &prev_hash,
            entry.event_type.as_str(),
            &entry.execution_id.to_string(),
            &entry.details_json,
            &entry.timestamp.to_rfc3339(),
        );
        tx.execute(
            "INSERT INTO audit_log (timestamp, execution_id, runbook_id, event_type, actor, \
             details, success, prev_hash, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.timestamp.unix_millis(),
                entry.execution_id.to_string(),
                entry.runbook_id.as_str(),
                entry.event_type.as_str(),
                entry.actor,
                entry.details_json,
                i64::from(entry.success),
                prev_hash,
                hash,
            ],
        )
        .map_err(|err| StoreError::Db(err.to_string()))?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(AuditEntry {
            id,
            timestamp: entry.timestamp,
            execution_id: entry.execution_id,
            runbook_id: entry.runbook_id,
            event_type: entry.event_type,
            actor: entry.actor,
            details_json: entry.details_json,
            success: entry.success,
            prev_hash,
            hash,
        })
    }

    fn get_execution_log(&self, execution_id: ExecutionId) -> Result<Vec<AuditEntry>, StoreError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT id, timestamp, execution_id, runbook_id, event_type, actor, details, \
                 success, prev_hash, hash
                 FROM audit_log WHERE execution_id = ?1 ORDER BY id",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![execution_id.to_string()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, String>(9)?,
                ))
            })
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut entries = Vec::new();
        for row in rows {
            let (
                id,
                timestamp,
                execution_id_text,
                runbook_id,
                event_type,
                actor,
                details,
                success,
                prev_hash,
                hash,
            ) = row.map_err(|err| StoreError::Db(err.to_string()))?;
            let event_type: AuditEventType =
                enum_from_text("event_type", &event_type).map_err(StoreError::from)?;
            entries.push(AuditEntry {
                id,
                timestamp: timestamp_from_millis("timestamp", timestamp)
                    .map_err(StoreError::from)?,
                execution_id: execution_id_from_text(&execution_id_text)
                    .map_err(StoreError::from)?,
                runbook_id: RunbookId::new(runbook_id),
                event_type,
                actor,
                details_json: details,
                success: success != 0,
                prev_hash,
                hash,
            });
        }
        Ok(entries)
    }
}

// ============================================================================
// SECTION: Metrics Store Implementation
// ============================================================================

impl MetricsStore for SqliteStore {
    fn record_metric(&self, sample: &MetricSample) -> Result<(), StoreError> {
        let dimensions = canonical_json_bytes(&sample.dimensions)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let dimensions = String::from_utf8(dimensions)
            .map_err(|err| StoreError::Invalid(err.to_string()))?;
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO metrics (period_start, period_end, metric_name, metric_value, \
                 dimensions)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (period_start, period_end, metric_name, dimensions)
                 DO UPDATE SET metric_value = excluded.metric_value",
                params![
                    sample.period_start.unix_millis(),
                    sample.period_end.unix_millis(),
                    sample.name,
                    sample.value,
                    dimensions,
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Adapter State Store Implementation
// ============================================================================

impl AdapterStateStore for SqliteStore {
    fn upsert_adapter(&self, row: &AdapterRow) -> Result<(), StoreError> {
        let health = row
            .health_status
            .map(|status| status.as_str().to_string());
        let connection = self.lock();
        connection
            .execute(
                "INSERT INTO adapters (name, type, enabled, config, health_status, \
                 last_health_check)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (name) DO UPDATE SET type = excluded.type, \
                 enabled = excluded.enabled, config = excluded.config, \
                 health_status = excluded.health_status, \
                 last_health_check = excluded.last_health_check",
                params![
                    row.name.as_str(),
                    row.adapter_type,
                    i64::from(row.enabled),
                    row.config_json,
                    health,
                    row.last_health_check.map(|at| at.unix_millis()),
                ],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(())
    }

    fn record_adapter_health(
        &self,
        name: &AdapterName,
        status: HealthState,
        checked_at: Timestamp,
    ) -> Result<(), StoreError> {
        let connection = self.lock();
        let changed = connection
            .execute(
                "UPDATE adapters SET health_status = ?1, last_health_check = ?2 WHERE name = ?3",
                params![status.as_str(), checked_at.unix_millis(), name.as_str()],
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(StoreError::NotFound(name.as_str().to_string()));
        }
        Ok(())
    }

    fn list_adapters(&self) -> Result<Vec<AdapterRow>, StoreError> {
        let connection = self.lock();
        let mut statement = connection
            .prepare(
                "SELECT name, type, enabled, config, health_status, last_health_check
                 FROM adapters ORDER BY name",
            )
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let mut records = Vec::new();
        for row in rows {
            let (name, adapter_type, enabled, config, health, checked_at) =
                row.map_err(|err| StoreError::Db(err.to_string()))?;
            let health_status = health
                .map(|text| enum_from_text::<HealthState>("health_status", &text))
                .transpose()
                .map_err(StoreError::from)?;
            let last_health_check = checked_at
                .map(|millis| timestamp_from_millis("last_health_check", millis))
                .transpose()
                .map_err(StoreError::from)?;
            records.push(AdapterRow {
                name: AdapterName::new(name),
                adapter_type,
                enabled: enabled != 0,
                config_json: config,
                health_status,
                last_health_check,
            });
        }
        Ok(records)
    }
}
