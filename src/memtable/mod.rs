//! MemTable Module
//!
//! In-memory store state.
//!
//! ## Responsibilities
//! - Hold the current `key -> value` map for the process lifetime
//! - Single-writer/multi-reader access pattern
//! - Let the store bundle a map mutation with other work under one
//!   exclusive lock
//!
//! ## Data Structure Choice
//! HashMap wrapped in a parking_lot RwLock: keys have no ordering
//! semantics and reads vastly outnumber writes.

mod table;

pub use table::MemTable;
