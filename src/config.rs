//! Configuration for kvlog
//!
//! Centralized configuration with sensible defaults. Only needed at
//! construction time; the store and journal never read it afterwards.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{KvError, Result};

/// Main configuration for a kvlog instance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backend Selection
    // -------------------------------------------------------------------------
    /// Which journal backend to open
    pub backend: BackendKind,

    /// Journal file for the file backend
    pub log_path: PathBuf,

    /// Settings for the SQLite backend
    pub sqlite: SqliteConfig,

    // -------------------------------------------------------------------------
    // Journal Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often the file backend fsyncs
    pub wal_sync_strategy: WalSyncStrategy,

    /// Events that may wait for the journal worker before writers block
    pub journal_capacity: usize,

    /// How long a write may wait for the journal to accept it (None = forever)
    pub accept_timeout_ms: Option<u64>,

    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// How the map is compensated when a durable append fails
    pub rollback_policy: RollbackPolicy,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// HTTP listen address
    pub listen_addr: String,
}

/// Journal backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum BackendKind {
    /// Line-oriented local file
    File,

    /// SQLite table
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl FromStr for BackendKind {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "file_transactor" | "in_memory_transactor" => Ok(BackendKind::File),
            "sqlite" | "relational" | "sqlite_transactor" | "postgres"
            | "postgres_transactor" => Ok(BackendKind::Sqlite),
            other => Err(KvError::UnknownBackend(other.to_string())),
        }
    }
}

impl TryFrom<String> for BackendKind {
    type Error = KvError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    ///
    /// Writes return success once the record reaches the OS, before its
    /// fsync. Up to `count - 1` acknowledged writes can be lost on power
    /// failure; a process crash alone loses nothing.
    EveryNEntries { count: usize },
}

/// Compensation applied to the map when a durable append fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Put back whatever the key held before the failed call
    RestorePrevious,

    /// Remove the key regardless of its previous value
    Remove,
}

/// SQLite synchronous pragma
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronousMode {
    Full,
    Normal,
}

impl SynchronousMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
        }
    }
}

/// SQLite backend settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file
    pub path: PathBuf,

    pub synchronous: SynchronousMode,

    /// How long to wait on a locked database (milliseconds)
    pub busy_timeout_ms: u64,

    /// Rows fetched per query during replay
    pub page_size: usize,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kvlog_data/journal.db"),
            synchronous: SynchronousMode::Full,
            busy_timeout_ms: 5000,
            page_size: 512,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            log_path: PathBuf::from("./kvlog_data/transactor.journal"),
            sqlite: SqliteConfig::default(),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            journal_capacity: 128,
            accept_timeout_ms: None,
            rollback_policy: RollbackPolicy::RestorePrevious,
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load a config from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&data)
            .map_err(|e| KvError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the journal cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.journal_capacity == 0 {
            return Err(KvError::Config("journal_capacity must be at least 1".into()));
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(KvError::Config("sync count must be at least 1".into()));
        }
        if self.sqlite.page_size == 0 {
            return Err(KvError::Config("sqlite.page_size must be at least 1".into()));
        }
        if self.listen_addr.trim().is_empty() {
            return Err(KvError::Config("listen_addr is empty".into()));
        }
        Ok(())
    }

    /// Acceptance deadline budget for journal writes
    pub fn accept_timeout(&self) -> Option<Duration> {
        self.accept_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from an existing config instead of the defaults
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Set the journal backend
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    /// Set the journal file used by the file backend
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Set the database file used by the SQLite backend
    pub fn sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sqlite.path = path.into();
        self
    }

    pub fn sqlite_synchronous(mut self, mode: SynchronousMode) -> Self {
        self.config.sqlite.synchronous = mode;
        self
    }

    pub fn sqlite_busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.sqlite.busy_timeout_ms = ms;
        self
    }

    pub fn sqlite_page_size(mut self, rows: usize) -> Self {
        self.config.sqlite.page_size = rows;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set how many events may queue for the journal worker
    pub fn journal_capacity(mut self, capacity: usize) -> Self {
        self.config.journal_capacity = capacity;
        self
    }

    /// Set the acceptance deadline for journal writes (in milliseconds)
    pub fn accept_timeout_ms(mut self, ms: u64) -> Self {
        self.config.accept_timeout_ms = Some(ms);
        self
    }

    pub fn rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.config.rollback_policy = policy;
        self
    }

    /// Set the HTTP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
