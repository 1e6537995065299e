//! Log Backend Module
//!
//! Durable, ordered, append-only storage for journal events.
//!
//! ## Contract
//! - `append` records one event durably or fails; no retries
//! - `replay` streams every stored event in ascending sequence order
//! - `close` releases the underlying handle; appends afterwards fail with
//!   `TransactorClosed`
//!
//! Backends never assign sequence numbers. The journal writer does, and is
//! the only caller of `append`, so implementations need no internal locking.

mod codec;
mod file;
mod sqlite;

pub use codec::{decode_record, encode_record};
pub use file::FileBackend;
pub use sqlite::SqliteBackend;

use crate::config::{BackendKind, Config};
use crate::error::Result;
use crate::journal::Event;

/// Lazy, ordered, one-shot stream of stored events
pub type EventStream<'a> = Box<dyn Iterator<Item = Result<Event>> + 'a>;

/// Durable event storage
pub trait LogBackend: Send {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Durably record one event
    fn append(&mut self, event: &Event) -> Result<()>;

    /// Stream all stored events from the beginning
    ///
    /// Returns `Ok(None)` when the backend has no stream to offer at all,
    /// which is distinct from an existing log holding zero events.
    fn replay(&mut self) -> Result<Option<EventStream<'_>>>;

    /// Force buffered appends to stable storage
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flush and release the underlying handle
    fn close(&mut self) -> Result<()>;
}

/// Open the backend selected by `config.backend`
pub fn open_backend(config: &Config) -> Result<Box<dyn LogBackend>> {
    let backend: Box<dyn LogBackend> = match config.backend {
        BackendKind::File => Box::new(FileBackend::open(
            &config.log_path,
            config.wal_sync_strategy,
        )?),
        BackendKind::Sqlite => Box::new(SqliteBackend::open(&config.sqlite)?),
    };

    tracing::info!(backend = backend.name(), "journal backend opened");
    Ok(backend)
}
