// crates/stratum-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Cluster State Store
// Description: Durable ClusterStateStore backed by SQLite.
// Purpose: Persist machine and block device records with schema versioning.
// Dependencies: stratum-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`ClusterStateStore`] using `SQLite`.
//! Machines live in one table keyed by machine id; block device documents
//! live in a second table whose primary key makes insert-if-absent a single
//! `INSERT OR IGNORE`. The schema version is checked on open and a mismatch
//! fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use stratum_core::BlockDeviceRecord;
use stratum_core::ClusterStateStore;
use stratum_core::InstanceId;
use stratum_core::MachineId;
use stratum_core::MachineRecord;
use stratum_core::StateStoreError;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
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
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
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

/// Configuration for the `SQLite` cluster state store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Returns a config for `path` with default pragmas.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
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
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StateStoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::VersionMismatch(message) => Self::Store(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error into a store error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed cluster state store.
#[derive(Clone)]
pub struct SqliteClusterStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteClusterStore {
    /// Opens (creating if needed) an `SQLite` cluster state store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite cluster state store");
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Inserts or replaces a machine row.
    fn write_machine(&self, machine: &MachineRecord) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO machines (machine_id, instance_id, series) VALUES (?1, ?2, ?3) ON \
                 CONFLICT(machine_id) DO UPDATE SET instance_id = excluded.instance_id, series = \
                 excluded.series",
                params![
                    machine.id.as_str(),
                    machine.instance_id.as_ref().map(InstanceId::as_str),
                    machine.series
                ],
            )
            .map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(())
    }

    /// Reads all machine rows ordered by id.
    fn read_machines(&self) -> Result<Vec<MachineRecord>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare("SELECT machine_id, instance_id, series FROM machines ORDER BY machine_id")
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params![], |row| {
                let id: String = row.get(0)?;
                let instance_id: Option<String> = row.get(1)?;
                let series: String = row.get(2)?;
                Ok(MachineRecord {
                    id: MachineId::new(id),
                    instance_id: instance_id.map(InstanceId::new),
                    series,
                })
            })
            .map_err(|err| db_error(&err))?;
        let mut machines = Vec::new();
        for row in rows {
            machines.push(row.map_err(|err| db_error(&err))?);
        }
        Ok(machines)
    }

    /// Reads the block device document for a machine.
    fn read_block_devices(
        &self,
        machine: &MachineId,
    ) -> Result<Option<BlockDeviceRecord>, SqliteStoreError> {
        let payload: Option<String> = {
            let guard = self.lock()?;
            guard
                .query_row(
                    "SELECT devices_json FROM block_devices WHERE machine_id = ?1",
                    params![machine.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| db_error(&err))?
        };
        let Some(payload) = payload else {
            return Ok(None);
        };
        let devices: Vec<String> = serde_json::from_str(&payload).map_err(|err| {
            SqliteStoreError::Invalid(format!("block devices for machine {machine}: {err}"))
        })?;
        Ok(Some(BlockDeviceRecord {
            machine_id: machine.clone(),
            devices,
        }))
    }

    /// Inserts a block device row unless the machine already has one.
    fn write_block_devices_if_absent(
        &self,
        record: &BlockDeviceRecord,
    ) -> Result<bool, SqliteStoreError> {
        let payload = serde_json::to_string(&record.devices)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        let guard = self.lock()?;
        let inserted = guard
            .execute(
                "INSERT OR IGNORE INTO block_devices (machine_id, devices_json) VALUES (?1, ?2)",
                params![record.machine_id.as_str(), payload],
            )
            .map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(inserted == 1)
    }
}

impl ClusterStateStore for SqliteClusterStore {
    fn upsert_machine(&self, machine: &MachineRecord) -> Result<(), StateStoreError> {
        self.write_machine(machine).map_err(StateStoreError::from)
    }

    fn machines(&self) -> Result<Vec<MachineRecord>, StateStoreError> {
        self.read_machines().map_err(StateStoreError::from)
    }

    fn block_devices(
        &self,
        machine: &MachineId,
    ) -> Result<Option<BlockDeviceRecord>, StateStoreError> {
        self.read_block_devices(machine).map_err(StateStoreError::from)
    }

    fn insert_block_devices_if_absent(
        &self,
        record: &BlockDeviceRecord,
    ) -> Result<bool, StateStoreError> {
        self.write_block_devices_if_absent(record).map_err(StateStoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS machines (
                    machine_id TEXT PRIMARY KEY,
                    instance_id TEXT,
                    series TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS block_devices (
                    machine_id TEXT PRIMARY KEY,
                    devices_json TEXT NOT NULL
                );",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}
