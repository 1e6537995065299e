//! Error types for kvlog
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for kvlog operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // Validation Errors
    // -------------------------------------------------------------------------
    #[error("key is empty")]
    EmptyKey,

    #[error("key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Journal Errors
    // -------------------------------------------------------------------------
    /// The durable append failed; the in-memory change was compensated.
    #[error("journal write failed: {0}")]
    JournalWriteFailed(#[source] Box<KvError>),

    #[error("transactor is closed")]
    TransactorClosed,

    /// The journal did not accept the event before the caller's deadline.
    /// Nothing was recorded.
    #[error("journal did not accept the event before the deadline")]
    AcceptTimeout,

    #[error("journal worker failed: {0}")]
    Worker(String),

    // -------------------------------------------------------------------------
    // Replay Errors
    // -------------------------------------------------------------------------
    #[error("transaction numbers out of sequence: {found} follows {previous}")]
    OutOfSequence { previous: u64, found: u64 },

    #[error("corrupt journal record at {location}: {reason}")]
    CorruptRecord { location: String, reason: String },

    #[error("empty journal: backend produced no replay stream")]
    EmptyJournal,

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// Build a `CorruptRecord` error
    pub fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        KvError::CorruptRecord {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// The error a failed durable append surfaced, if this is one
    pub fn journal_cause(&self) -> Option<&KvError> {
        match self {
            KvError::JournalWriteFailed(cause) => Some(cause),
            _ => None,
        }
    }
}
