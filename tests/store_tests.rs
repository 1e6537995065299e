//! Tests for KvStore
//!
//! These tests verify:
//! - Basic get/put/delete operations and key validation
//! - Replay determinism and fatal replay errors
//! - Rollback when the durable append fails (both policies)
//! - Rollback with overlapping writers on one key
//! - Closed-store contract
//! - Concurrent access patterns

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::MemoryLog;
use crossbeam::channel::{self, Receiver, Sender};
use kvlog::config::{Config, RollbackPolicy};
use kvlog::journal::{Event, EventType};
use kvlog::{KvError, KvStore, Store};

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(log: &MemoryLog) -> KvStore {
    KvStore::with_backend(log.backend().boxed(), &Config::default()).unwrap()
}

fn open_store_with_policy(log: &MemoryLog, policy: RollbackPolicy) -> KvStore {
    let config = Config::builder().rollback_policy(policy).build();
    KvStore::with_backend(log.backend().boxed(), &config).unwrap()
}

/// Store whose appends each wait for a gate message and announce that
/// they started
fn gated_store(log: &MemoryLog) -> (Arc<KvStore>, Sender<()>, Receiver<()>) {
    let (gate_tx, gate_rx) = channel::unbounded();
    let (entered_tx, entered_rx) = channel::unbounded();
    let mut backend = log.backend();
    backend.gate = Some(gate_rx);
    backend.entered = Some(entered_tx);

    let store = KvStore::with_backend(backend.boxed(), &Config::default()).unwrap();
    (Arc::new(store), gate_tx, entered_rx)
}

/// Block until the map serves `expected` for `key`
fn wait_for_value(store: &KvStore, key: &str, expected: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.get(key).ok().as_deref() != Some(expected) {
        assert!(Instant::now() < deadline, "{} never became {:?}", key, expected);
        thread::sleep(Duration::from_millis(1));
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_get() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.put("hello", "world").unwrap();
    assert_eq!(store.get("hello").unwrap(), "world");
}

#[test]
fn test_get_nonexistent_key() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    assert!(matches!(store.get("nonexistent"), Err(KvError::KeyNotFound)));
}

#[test]
fn test_put_overwrite() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.put("key", "value1").unwrap();
    store.put("key", "value2").unwrap();

    assert_eq!(store.get("key").unwrap(), "value2");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_delete() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.put("key", "value").unwrap();
    store.delete("key").unwrap();

    assert!(matches!(store.get("key"), Err(KvError::KeyNotFound)));
}

#[test]
fn test_delete_nonexistent_key() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    // Should not error, and is still journaled
    store.delete("nonexistent").unwrap();
    assert_eq!(log.events(), vec![Event::delete(1, "nonexistent")]);
}

#[test]
fn test_empty_value_is_allowed() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.put("key", "").unwrap();
    assert_eq!(store.get("key").unwrap(), "");
}

#[test]
fn test_empty_key_rejected_everywhere() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    for value in ["", "v", "some longer value"] {
        assert!(matches!(store.put("", value), Err(KvError::EmptyKey)));
    }
    assert!(matches!(store.get(""), Err(KvError::EmptyKey)));
    assert!(matches!(store.delete(""), Err(KvError::EmptyKey)));

    // Rejected before any I/O
    assert!(log.events().is_empty());
}

#[test]
fn test_mutations_are_journaled_in_order() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.put("a", "1").unwrap();
    store.put("b", "2").unwrap();
    store.delete("a").unwrap();

    assert_eq!(
        log.events(),
        vec![Event::put(1, "a", "1"), Event::put(2, "b", "2"), Event::delete(3, "a")]
    );
    assert_eq!(store.last_sequence(), 3);
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_replay_determinism() {
    let log = MemoryLog::with_events(vec![
        Event::put(1, "a", "1"),
        Event::put(2, "a", "2"),
        Event::delete(3, "a"),
        Event::put(4, "b", "3"),
    ]);
    let store = open_store(&log);

    assert!(matches!(store.get("a"), Err(KvError::KeyNotFound)));
    assert_eq!(store.get("b").unwrap(), "3");
    assert_eq!(store.len(), 1);
    assert_eq!(store.snapshot(), vec![("b".to_string(), "3".to_string())]);
}

#[test]
fn test_replay_continues_sequence() {
    let log = MemoryLog::with_events(vec![Event::put(1, "a", "1"), Event::put(2, "b", "2")]);
    let store = open_store(&log);

    assert_eq!(store.last_sequence(), 2);
    store.put("c", "3").unwrap();
    assert_eq!(log.sequences(), vec![1, 2, 3]);
}

#[test]
fn test_out_of_sequence_replay_fails_construction() {
    let log = MemoryLog::with_events(vec![
        Event::put(1, "a", "1"),
        Event::put(3, "b", "2"),
        Event::put(2, "c", "3"),
    ]);

    match KvStore::with_backend(log.backend().boxed(), &Config::default()) {
        Err(KvError::OutOfSequence { previous, found }) => {
            assert_eq!(previous, 3);
            assert_eq!(found, 2);
        }
        Err(other) => panic!("expected OutOfSequence, got {:?}", other),
        Ok(_) => panic!("store must not open from an out-of-sequence log"),
    }

    // The backend is released on the error path
    assert!(log.is_closed());
}

#[test]
fn test_missing_replay_stream_fails_construction() {
    let log = MemoryLog::new();
    let mut backend = log.backend();
    backend.no_stream = true;

    let result = KvStore::with_backend(backend.boxed(), &Config::default());
    assert!(matches!(result, Err(KvError::EmptyJournal)));
}

// =============================================================================
// Rollback Tests
// =============================================================================

#[test]
fn test_failed_put_of_new_key_leaves_it_absent() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    log.set_failing(true);
    let err = store.put("k", "v").unwrap_err();

    assert!(matches!(err, KvError::JournalWriteFailed(_)));
    assert!(matches!(err.journal_cause(), Some(KvError::Io(_))));
    assert!(matches!(store.get("k"), Err(KvError::KeyNotFound)));
}

#[test]
fn test_failed_overwrite_restores_previous_value() {
    let log = MemoryLog::new();
    let store = open_store_with_policy(&log, RollbackPolicy::RestorePrevious);

    store.put("k", "v1").unwrap();
    log.set_failing(true);

    assert!(matches!(store.put("k", "v2"), Err(KvError::JournalWriteFailed(_))));
    assert_eq!(store.get("k").unwrap(), "v1");
}

#[test]
fn test_failed_overwrite_with_remove_policy_drops_key() {
    let log = MemoryLog::new();
    let store = open_store_with_policy(&log, RollbackPolicy::Remove);

    store.put("k", "v1").unwrap();
    log.set_failing(true);

    assert!(matches!(store.put("k", "v2"), Err(KvError::JournalWriteFailed(_))));
    assert!(matches!(store.get("k"), Err(KvError::KeyNotFound)));
}

#[test]
fn test_failed_delete_restores_value() {
    let log = MemoryLog::new();
    let store = open_store_with_policy(&log, RollbackPolicy::RestorePrevious);

    store.put("k", "v1").unwrap();
    log.set_failing(true);

    assert!(matches!(store.delete("k"), Err(KvError::JournalWriteFailed(_))));
    assert_eq!(store.get("k").unwrap(), "v1");
}

#[test]
fn test_failed_delete_with_remove_policy_keeps_key_removed() {
    let log = MemoryLog::new();
    let store = open_store_with_policy(&log, RollbackPolicy::Remove);

    store.put("k", "v1").unwrap();
    log.set_failing(true);

    assert!(matches!(store.delete("k"), Err(KvError::JournalWriteFailed(_))));
    assert!(matches!(store.get("k"), Err(KvError::KeyNotFound)));
}

#[test]
fn test_map_matches_log_after_failures() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.put("a", "1").unwrap();
    log.set_failing(true);
    let _ = store.put("a", "2");
    let _ = store.put("b", "1");
    let _ = store.delete("a");
    log.set_failing(false);
    store.put("c", "1").unwrap();
    drop(store);

    // A fresh replay of the log agrees with what the store served
    let replayed = open_store(&MemoryLog::with_events(log.events()));
    assert_eq!(
        replayed.snapshot(),
        vec![("a".to_string(), "1".to_string()), ("c".to_string(), "1".to_string())]
    );
    assert_eq!(log.sequences(), vec![1, 2]);
}

// =============================================================================
// Overlapping Writer Tests
// =============================================================================

#[test]
fn test_two_failed_puts_leave_nothing_behind() {
    let log = MemoryLog::new();
    let (store, gate, entered) = gated_store(&log);
    log.set_failing(true);

    let first = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.put("k", "a"))
    };
    entered.recv().unwrap();

    let second = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.put("k", "b"))
    };
    wait_for_value(&store, "k", "b");

    // First append fails while the second is still queued
    gate.send(()).unwrap();
    assert!(matches!(first.join().unwrap(), Err(KvError::JournalWriteFailed(_))));
    assert_eq!(store.get("k").unwrap(), "b");

    entered.recv().unwrap();
    gate.send(()).unwrap();
    assert!(matches!(second.join().unwrap(), Err(KvError::JournalWriteFailed(_))));

    // Neither value ever reached the log
    assert!(matches!(store.get("k"), Err(KvError::KeyNotFound)));
    assert!(log.events().is_empty());
}

#[test]
fn test_failed_delete_does_not_undo_later_delete() {
    let log = MemoryLog::new();
    let (store, gate, entered) = gated_store(&log);

    gate.send(()).unwrap();
    store.put("k", "v").unwrap();
    entered.recv().unwrap();

    log.set_failing(true);
    let first = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.delete("k"))
    };
    entered.recv().unwrap();

    let second = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.delete("k"))
    };
    thread::sleep(Duration::from_millis(20));

    gate.send(()).unwrap();
    entered.recv().unwrap();
    log.set_failing(false);
    gate.send(()).unwrap();

    assert!(matches!(first.join().unwrap(), Err(KvError::JournalWriteFailed(_))));
    second.join().unwrap().unwrap();

    assert!(matches!(store.get("k"), Err(KvError::KeyNotFound)));
    assert_eq!(log.events(), vec![Event::put(1, "k", "v"), Event::delete(2, "k")]);
}

#[test]
fn test_failed_put_after_durable_put_keeps_durable_value() {
    let log = MemoryLog::new();
    let (store, gate, entered) = gated_store(&log);

    let first = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.put("k", "a"))
    };
    entered.recv().unwrap();

    let second = {
        let store = Arc::clone(&store);
        thread::spawn(move || store.put("k", "b"))
    };
    wait_for_value(&store, "k", "b");

    gate.send(()).unwrap();
    entered.recv().unwrap();
    log.set_failing(true);
    gate.send(()).unwrap();

    first.join().unwrap().unwrap();
    assert!(matches!(second.join().unwrap(), Err(KvError::JournalWriteFailed(_))));

    assert_eq!(store.get("k").unwrap(), "a");
    assert_eq!(log.events(), vec![Event::put(1, "k", "a")]);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_operations_after_close_fail() {
    let log = MemoryLog::new();
    let store = open_store(&log);
    store.put("k", "v").unwrap();

    store.close().unwrap();

    assert!(matches!(store.put("k", "v2"), Err(KvError::TransactorClosed)));
    assert!(matches!(store.delete("k"), Err(KvError::TransactorClosed)));
    assert!(matches!(store.get("k"), Err(KvError::TransactorClosed)));
    assert_eq!(log.events().len(), 1);
}

#[test]
fn test_close_twice_returns_closed() {
    let log = MemoryLog::new();
    let store = open_store(&log);

    store.close().unwrap();
    assert!(matches!(store.close(), Err(KvError::TransactorClosed)));
}

#[test]
fn test_status_reports_state() {
    let log = MemoryLog::new();
    let store = open_store(&log);
    store.put("a", "1").unwrap();

    let status = store.status().unwrap();
    assert_eq!(status.backend, "memory");
    assert_eq!(status.last_sequence, 1);
    assert_eq!(status.keys, 1);
    assert!(!status.closed);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_puts_on_distinct_keys() {
    let log = MemoryLog::new();
    let store = Arc::new(open_store(&log));

    let mut handles = Vec::new();
    for t in 0..10 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..20 {
                store.put(&format!("t{}:k{}", t, i), &format!("{}", i)).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    store.close().unwrap();

    let expected: Vec<u64> = (1..=200).collect();
    assert_eq!(log.sequences(), expected);
    assert!(log.events().iter().all(|e| e.event_type == EventType::Put));
    assert_eq!(store.len(), 200);
}

#[test]
fn test_concurrent_writes_to_one_key_match_log() {
    let log = MemoryLog::new();
    let store = Arc::new(open_store(&log));

    let mut handles = Vec::new();
    for t in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                store.put("shared", &format!("{}-{}", t, i)).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let served = store.get("shared").unwrap();
    store.close().unwrap();

    // The last logged write is the value memory ended with
    let last = log.events().pop().unwrap();
    assert_eq!(last.value, served);
}

#[test]
fn test_concurrent_reads_and_writes() {
    let log = MemoryLog::new();
    let store = Arc::new(open_store(&log));
    store.put("stable", "value").unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                assert_eq!(store.get("stable").unwrap(), "value");
            }
        }));
    }
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                store.put(&format!("w{}:{}", t, i), "x").unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.len(), 201);
}
