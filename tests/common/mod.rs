//! Shared test helpers
//!
//! `MemoryBackend` keeps its events behind an `Arc` so a test can inspect
//! what the journal wrote after handing the backend over, and can inject
//! append failures or stall appends.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{Receiver, Sender};
use kvlog::backend::{EventStream, LogBackend};
use kvlog::journal::Event;
use kvlog::{KvError, Result};
use parking_lot::Mutex;

/// Handle to a MemoryBackend's state that survives the backend being moved
#[derive(Clone, Default)]
pub struct MemoryLog {
    pub events: Arc<Mutex<Vec<Event>>>,
    pub fail_appends: Arc<AtomicBool>,
    pub closed: Arc<AtomicBool>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        let log = Self::default();
        *log.events.lock() = events;
        log
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn sequences(&self) -> Vec<u64> {
        self.events.lock().iter().map(|e| e.sequence).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            log: self.clone(),
            no_stream: false,
            gate: None,
            entered: None,
        }
    }
}

pub struct MemoryBackend {
    log: MemoryLog,

    /// Pretend the backend has no replay stream at all
    pub no_stream: bool,

    /// When set, each append waits for one message before completing
    pub gate: Option<Receiver<()>>,

    /// When set, each append announces that it started
    pub entered: Option<Sender<()>>,
}

impl MemoryBackend {
    pub fn boxed(self) -> Box<dyn LogBackend> {
        Box::new(self)
    }
}

impl LogBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append(&mut self, event: &Event) -> Result<()> {
        if self.log.is_closed() {
            return Err(KvError::TransactorClosed);
        }
        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        if self.log.fail_appends.load(Ordering::SeqCst) {
            return Err(KvError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected append failure",
            )));
        }
        self.log.events.lock().push(event.clone());
        Ok(())
    }

    fn replay(&mut self) -> Result<Option<EventStream<'_>>> {
        if self.no_stream {
            return Ok(None);
        }
        let events = self.log.events();
        Ok(Some(Box::new(events.into_iter().map(Ok))))
    }

    fn close(&mut self) -> Result<()> {
        if self.log.closed.swap(true, Ordering::SeqCst) {
            return Err(KvError::TransactorClosed);
        }
        Ok(())
    }
}
