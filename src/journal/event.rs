//! Journal event definitions
//!
//! Defines the atomic unit of durability.

use std::fmt;

use serde::Serialize;

use crate::error::{KvError, Result};

/// A single entry in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Position in the log - strictly increasing, assigned by the journal writer
    pub sequence: u64,

    /// The mutation recorded
    pub event_type: EventType,

    pub key: String,

    /// Empty for deletes
    pub value: String,
}

impl Event {
    pub fn put(sequence: u64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence,
            event_type: EventType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(sequence: u64, key: impl Into<String>) -> Self {
        Self {
            sequence,
            event_type: EventType::Delete,
            key: key.into(),
            value: String::new(),
        }
    }
}

/// Mutations that can be logged
///
/// The discriminants are the persisted codes and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum EventType {
    Delete = 1,
    Put = 2,
}

impl EventType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EventType {
    type Error = KvError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            1 => Ok(EventType::Delete),
            2 => Ok(EventType::Put),
            other => Err(KvError::corrupt(
                "event type",
                format!("unknown event type code {}", other),
            )),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Delete => f.write_str("DELETE"),
            EventType::Put => f.write_str("PUT"),
        }
    }
}
