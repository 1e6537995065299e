//! Journal Writer
//!
//! Serializes concurrent writes into one sequence-numbered stream.
//!
//! ## Design
//! A dedicated worker thread owns the backend and drains a bounded
//! crossbeam channel. Sequence numbers are assigned by the worker in the
//! order requests are accepted into the channel, so the channel is the
//! single serialization point for physical writes.
//!
//! ```text
//!  put/delete ──┐
//!  put/delete ──┼──► [bounded channel] ──► worker ──► LogBackend::append
//!  put/delete ──┘          (accept)        (seq++)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::backend::LogBackend;
use crate::error::{KvError, Result};

use super::{Event, EventType};

/// An event waiting for the worker
struct AppendRequest {
    event_type: EventType,
    key: String,
    value: String,
    reply: Sender<Result<u64>>,
}

/// An accepted write whose durable outcome is still pending
#[must_use = "an accepted append must be waited on to learn whether it is durable"]
pub struct PendingAppend {
    reply: Receiver<Result<u64>>,
}

impl PendingAppend {
    /// Block until the backend has recorded (or rejected) the event
    ///
    /// Returns the assigned sequence number.
    pub fn wait(self) -> Result<u64> {
        self.reply
            .recv()
            .map_err(|_| KvError::Worker("journal worker exited before replying".into()))?
    }
}

/// Ordered, sequence-numbering front end to a log backend
pub struct JournalWriter {
    /// `None` once closed; dropping it lets the worker drain and exit
    sender: Mutex<Option<Sender<AppendRequest>>>,

    worker: Mutex<Option<JoinHandle<Result<()>>>>,

    closed: AtomicBool,

    /// Mirror of the worker's counter for readers
    last_sequence: Arc<AtomicU64>,

    backend_name: &'static str,
}

impl JournalWriter {
    /// Start a writer over `backend`
    ///
    /// `last_sequence` is the highest sequence already stored (0 for a fresh
    /// log); the first appended event gets `last_sequence + 1`.
    pub fn start(
        backend: Box<dyn LogBackend>,
        last_sequence: u64,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(KvError::Config("journal capacity must be at least 1".into()));
        }

        let backend_name = backend.name();
        let (sender, receiver) = channel::bounded(capacity);
        let counter = Arc::new(AtomicU64::new(last_sequence));
        let worker_counter = Arc::clone(&counter);

        let worker = thread::Builder::new()
            .name(format!("kvlog-journal-{}", backend_name))
            .spawn(move || run_worker(backend, receiver, worker_counter))?;

        tracing::debug!(backend = backend_name, last_sequence, capacity, "journal writer started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
            last_sequence: counter,
            backend_name,
        })
    }

    /// Hand an event to the worker
    ///
    /// Returns once the event is accepted, i.e. its position in the log is
    /// fixed. With a deadline, gives up with `AcceptTimeout` if the queue
    /// stays full; the event is then not recorded.
    pub fn submit(
        &self,
        event_type: EventType,
        key: &str,
        value: &str,
        deadline: Option<Instant>,
    ) -> Result<PendingAppend> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KvError::TransactorClosed);
        }
        let sender = self.sender.lock().clone().ok_or(KvError::TransactorClosed)?;

        let (reply, reply_rx) = channel::bounded(1);
        let request = AppendRequest {
            event_type,
            key: key.to_owned(),
            value: value.to_owned(),
            reply,
        };

        match deadline {
            Some(deadline) => sender.send_deadline(request, deadline).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => KvError::AcceptTimeout,
                SendTimeoutError::Disconnected(_) => KvError::TransactorClosed,
            })?,
            None => sender
                .send(request)
                .map_err(|_| KvError::TransactorClosed)?,
        }

        Ok(PendingAppend { reply: reply_rx })
    }

    /// Highest sequence durably appended
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drain accepted events, close the backend and stop the worker
    ///
    /// Every event accepted before this call is handed to the backend before
    /// it returns. A second call returns `TransactorClosed`.
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(KvError::TransactorClosed);
        }

        // Writers still holding a cloned sender finish their send first;
        // the worker exits once every sender is gone and the queue is empty.
        drop(self.sender.lock().take());

        let handle = self.worker.lock().take();
        let outcome = match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| KvError::Worker("journal worker panicked".into()))?,
            None => Ok(()),
        };

        match &outcome {
            Ok(()) => tracing::info!(
                backend = self.backend_name,
                last_sequence = self.last_sequence(),
                "journal closed"
            ),
            Err(e) => tracing::error!(backend = self.backend_name, error = %e, "journal close failed"),
        }
        outcome
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                tracing::error!(error = %e, "journal close on drop failed");
            }
        }
    }
}

/// Worker loop: assign sequence numbers and append in acceptance order
fn run_worker(
    mut backend: Box<dyn LogBackend>,
    requests: Receiver<AppendRequest>,
    counter: Arc<AtomicU64>,
) -> Result<()> {
    let mut last = counter.load(Ordering::Acquire);

    for request in requests.iter() {
        let sequence = last + 1;
        let event = Event {
            sequence,
            event_type: request.event_type,
            key: request.key,
            value: request.value,
        };

        let outcome = match backend.append(&event) {
            Ok(()) => {
                // A failed append leaves no record, so the number is reused
                last = sequence;
                counter.store(sequence, Ordering::Release);
                tracing::trace!(sequence, event_type = %event.event_type, key = %event.key, "event stored");
                Ok(sequence)
            }
            Err(e) => {
                tracing::error!(sequence, key = %event.key, error = %e, "journal append failed");
                Err(e)
            }
        };

        // The caller may have given up waiting; the record stands either way
        let _ = request.reply.send(outcome);
    }

    backend.close()
}
