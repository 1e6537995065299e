//! Store Module
//!
//! The key-value store that coordinates the memtable and the journal.
//!
//! ## Responsibilities
//! - Validate keys before any I/O
//! - Apply mutations to memory, then make them durable through the journal
//! - Compensate the in-memory change when the durable append fails
//! - Rebuild memory state by replaying the journal on startup

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

use crate::backend::{open_backend, LogBackend};
use crate::config::{Config, RollbackPolicy};
use crate::error::{KvError, Result};
use crate::journal::{self, Event, EventType, JournalWriter, PendingAppend};
use crate::memtable::MemTable;

/// Operations exposed to external callers (e.g. the HTTP layer)
pub trait Store: Send + Sync {
    /// Set `key` to `value`; returns once the change is durable
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Current value of `key`
    fn get(&self, key: &str) -> Result<String>;

    /// Remove `key` (absent keys are fine); returns once the change is durable
    fn delete(&self, key: &str) -> Result<()>;

    /// Diagnostics for health reporting
    fn status(&self) -> Option<StoreStatus> {
        None
    }
}

/// Point-in-time view of a store for health checks
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub backend: &'static str,
    pub last_sequence: u64,
    pub keys: usize,
    pub closed: bool,
}

/// In-memory map backed by a durable journal
///
/// ## Concurrency Model
///
/// - **Reads** take the memtable's shared lock only.
/// - **Writes** get the event *accepted* by the journal and mutate the map
///   under one exclusive lock, so the order of changes to a key in memory
///   matches their order in the log. Waiting for the durable append happens
///   after the lock is released.
///
/// A write is visible to readers before it is durable. If the append then
/// fails the change is compensated, but a reader may already have seen it.
pub struct KvStore {
    table: MemTable,
    journal: JournalWriter,

    /// Writes accepted but not yet settled, per key. Only locked while the
    /// memtable's write lock is held.
    in_flight: Mutex<InFlight>,

    rollback: RollbackPolicy,
    accept_timeout: Option<std::time::Duration>,
}

impl KvStore {
    /// Open the configured backend and rebuild state from it
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let backend = open_backend(config)?;
        Self::with_backend(backend, config)
    }

    /// Rebuild state from `backend` and start journaling to it
    ///
    /// Fails if replay fails; no partially rebuilt store is ever returned.
    pub fn with_backend(mut backend: Box<dyn LogBackend>, config: &Config) -> Result<Self> {
        let mut map = HashMap::new();

        let summary = match journal::replay(backend.as_mut(), |event| apply_event(&mut map, event)) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(backend = backend.name(), error = %e, "failed to restore state");
                if let Err(close_err) = backend.close() {
                    tracing::warn!(error = %close_err, "failed to close backend after replay error");
                }
                return Err(e);
            }
        };

        let journal = JournalWriter::start(backend, summary.last_sequence, config.journal_capacity)?;
        tracing::debug!(keys = map.len(), "state restored");

        Ok(Self {
            table: MemTable::from_map(map),
            journal,
            in_flight: Mutex::new(InFlight::default()),
            rollback: config.rollback_policy,
            accept_timeout: config.accept_timeout(),
        })
    }

    /// Close the journal, flushing every accepted write
    ///
    /// A second call returns `TransactorClosed`.
    pub fn close(&self) -> Result<()> {
        self.journal.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Highest sequence durably recorded
    pub fn last_sequence(&self) -> u64 {
        self.journal.last_sequence()
    }

    pub fn backend_name(&self) -> &'static str {
        self.journal.backend_name()
    }

    pub fn is_closed(&self) -> bool {
        self.journal.is_closed()
    }

    /// All live pairs sorted by key
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.table.snapshot()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn deadline(&self) -> Option<Instant> {
        self.accept_timeout.map(|timeout| Instant::now() + timeout)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.journal.is_closed() {
            return Err(KvError::TransactorClosed);
        }
        Ok(())
    }

    /// Journal a mutation and apply it to the map; `None` deletes the key
    fn write(&self, event_type: EventType, key: &str, value: Option<&str>) -> Result<()> {
        validate_key(key)?;
        self.ensure_open()?;

        let deadline = self.deadline();
        let accepted: Result<(u64, PendingAppend)> = self.table.update(|map| {
            let pending = self
                .journal
                .submit(event_type, key, value.unwrap_or(""), deadline)?;

            let ticket = self.in_flight.lock().track(
                key,
                map.get(key).cloned(),
                value.map(str::to_owned),
            );
            match value {
                Some(value) => {
                    map.insert(key.to_owned(), value.to_owned());
                }
                None => {
                    map.remove(key);
                }
            }
            Ok((ticket, pending))
        });

        // Nothing was applied if the journal refused the event
        let (ticket, pending) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(key, %event_type, error = %e, "journal rejected write");
                return Err(journal_error(e));
            }
        };

        let outcome = pending.wait();
        self.table.update(|map| {
            self.in_flight
                .lock()
                .settle(map, key, ticket, outcome.is_ok(), self.rollback)
        });

        match outcome {
            Ok(sequence) => {
                tracing::debug!(key, sequence, %event_type, "write succeeded");
                Ok(())
            }
            Err(e) => {
                tracing::error!(key, %event_type, error = %e, "journal write failed, rolled back");
                Err(journal_error(e))
            }
        }
    }
}

impl Store for KvStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.write(EventType::Put, key, Some(value))
    }

    fn get(&self, key: &str) -> Result<String> {
        validate_key(key)?;
        self.ensure_open()?;

        self.table.get(key).ok_or(KvError::KeyNotFound)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.write(EventType::Delete, key, None)
    }

    fn status(&self) -> Option<StoreStatus> {
        Some(StoreStatus {
            backend: self.backend_name(),
            last_sequence: self.last_sequence(),
            keys: self.len(),
            closed: self.is_closed(),
        })
    }
}

// =============================================================================
// In-flight Write Tracking
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Durable,
    Failed,
}

/// An accepted write to one key
struct TrackedWrite {
    ticket: u64,

    /// `None` for a delete
    value: Option<String>,

    outcome: Outcome,
}

/// Unsettled writes to one key, in acceptance (= log) order
struct KeyWrites {
    /// What the log holds for the key before the oldest unsettled write
    durable: Option<String>,

    writes: VecDeque<TrackedWrite>,
}

/// Per-key bookkeeping that lets compensation restore the last durable
/// value, no matter the order in which waiters come back
#[derive(Default)]
struct InFlight {
    next_ticket: u64,
    keys: HashMap<String, KeyWrites>,
}

impl InFlight {
    /// Register an accepted write; `current` is the map's value before it
    fn track(&mut self, key: &str, current: Option<String>, value: Option<String>) -> u64 {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        // With nothing in flight for the key, the map agrees with the log
        let entry = self.keys.entry(key.to_owned()).or_insert_with(|| KeyWrites {
            durable: current,
            writes: VecDeque::new(),
        });
        entry.writes.push_back(TrackedWrite {
            ticket,
            value,
            outcome: Outcome::Pending,
        });
        ticket
    }

    /// Record a write's outcome and bring the map back in line with the log
    fn settle(
        &mut self,
        map: &mut HashMap<String, String>,
        key: &str,
        ticket: u64,
        succeeded: bool,
        policy: RollbackPolicy,
    ) {
        let Some(entry) = self.keys.get_mut(key) else {
            return;
        };

        let outcome = if succeeded { Outcome::Durable } else { Outcome::Failed };
        if let Some(write) = entry.writes.iter_mut().find(|w| w.ticket == ticket) {
            write.outcome = outcome;
        }

        // Fold the settled prefix into the durable value
        while entry
            .writes
            .front()
            .map_or(false, |w| w.outcome != Outcome::Pending)
        {
            if let Some(write) = entry.writes.pop_front() {
                if write.outcome == Outcome::Durable {
                    entry.durable = write.value;
                }
            }
        }

        if outcome == Outcome::Failed {
            match policy {
                RollbackPolicy::Remove => {
                    map.remove(key);
                }
                RollbackPolicy::RestorePrevious => {
                    // Latest write that may still reach the log, else the log itself
                    let restored = entry
                        .writes
                        .iter()
                        .rev()
                        .find(|w| w.outcome != Outcome::Failed)
                        .map_or(&entry.durable, |w| &w.value);
                    match restored {
                        Some(value) => map.insert(key.to_owned(), value.clone()),
                        None => map.remove(key),
                    };
                }
            }
        }

        if entry.writes.is_empty() {
            self.keys.remove(key);
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KvError::EmptyKey);
    }
    Ok(())
}

/// Closed journals report as such; every other failure is a write failure
fn journal_error(e: KvError) -> KvError {
    match e {
        KvError::TransactorClosed => KvError::TransactorClosed,
        other => KvError::JournalWriteFailed(Box::new(other)),
    }
}

/// Apply a replayed event to the map being rebuilt
fn apply_event(map: &mut HashMap<String, String>, event: Event) {
    match event.event_type {
        EventType::Put => {
            map.insert(event.key, event.value);
        }
        EventType::Delete => {
            map.remove(&event.key);
        }
    }
}
