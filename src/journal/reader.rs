//! Journal Reader
//!
//! Ordered, one-shot replay of a backend's event stream.

use crate::backend::LogBackend;
use crate::error::{KvError, Result};

use super::Event;

/// Validates sequence order over a backend's replay stream
///
/// Yields events while their sequence numbers strictly increase. The first
/// error (from the backend or an ordering violation) is yielded once and
/// ends the stream.
pub struct JournalReader<I> {
    inner: I,

    /// Highest sequence yielded so far (0 before the first event)
    last_sequence: u64,

    events_read: u64,
    finished: bool,
}

impl<I> JournalReader<I>
where
    I: Iterator<Item = Result<Event>>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            last_sequence: 0,
            events_read: 0,
            finished: false,
        }
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }
}

impl<I> Iterator for JournalReader<I>
where
    I: Iterator<Item = Result<Event>>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.inner.next() {
            Some(Ok(event)) => {
                if event.sequence <= self.last_sequence {
                    self.finished = true;
                    return Some(Err(KvError::OutOfSequence {
                        previous: self.last_sequence,
                        found: event.sequence,
                    }));
                }
                self.last_sequence = event.sequence;
                self.events_read += 1;
                Some(Ok(event))
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Outcome of a complete replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub events: u64,

    /// Highest sequence in the log, 0 for an empty log
    pub last_sequence: u64,
}

/// Replay every stored event in order, handing each to `apply`
///
/// Stops at the first error. A backend without a replay stream is
/// `EmptyJournal`.
pub fn replay<F>(backend: &mut dyn LogBackend, mut apply: F) -> Result<ReplaySummary>
where
    F: FnMut(Event),
{
    let name = backend.name();
    let stream = backend.replay()?.ok_or(KvError::EmptyJournal)?;
    let mut reader = JournalReader::new(stream);

    for event in &mut reader {
        apply(event?);
    }

    let summary = ReplaySummary {
        events: reader.events_read(),
        last_sequence: reader.last_sequence(),
    };
    tracing::info!(
        backend = name,
        events = summary.events,
        last_sequence = summary.last_sequence,
        "journal replayed"
    );
    Ok(summary)
}
