//! Journal Module
//!
//! Sequencing layer between the store and a log backend.
//!
//! ## Responsibilities
//! - Assign strictly increasing sequence numbers (starting at 1)
//! - Serialize concurrent writes into one ordered stream
//! - Report every append failure back to its caller
//! - Replay the log in order, rejecting out-of-sequence records
//!
//! The writer and reader are backend-agnostic; see [`crate::backend`] for the
//! concrete storage formats.

mod event;
mod reader;
mod writer;

pub use event::{Event, EventType};
pub use reader::{replay, JournalReader, ReplaySummary};
pub use writer::{JournalWriter, PendingAppend};
