//! # kvlog
//!
//! A crash-recoverable key-value store with:
//! - An append-only transaction log (journal) for durability
//! - Full replay of the journal on startup
//! - Interchangeable log backends (local file, SQLite)
//! - Single-writer ordering with concurrent readers
//! - An HTTP front end
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Server                             │
//! │                 PUT/GET/DELETE /v1/{key}                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  Store trait
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      KvStore                                 │
//! │        MemTable (RwLock)  +  rollback on failed append       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!                       ▼
//!               ┌───────────────┐
//!               │ JournalWriter │  (sequence numbers, ordering)
//!               └───────┬───────┘
//!                       │  LogBackend trait
//!          ┌────────────┴────────────┐
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ FileBackend │          │SqliteBackend│
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod journal;
pub mod backend;
pub mod memtable;
pub mod store;
pub mod http;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use store::{KvStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
