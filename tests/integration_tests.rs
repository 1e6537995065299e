//! Integration tests for kvlog
//!
//! Full open → write → close → reopen cycles against real backends.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use std::thread;

use kvlog::config::{BackendKind, Config, WalSyncStrategy};
use kvlog::{KvError, KvStore, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn file_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .backend(BackendKind::File)
        .log_path(temp_dir.path().join("data").join("transactor.journal"))
        .build()
}

fn sqlite_config(temp_dir: &TempDir) -> Config {
    Config::builder()
        .backend(BackendKind::Sqlite)
        .sqlite_path(temp_dir.path().join("journal.db"))
        .sqlite_page_size(4)
        .build()
}

// =============================================================================
// Crash Recovery Tests
// =============================================================================

fn restart_restores_latest_value(config: Config) {
    let store = KvStore::open(&config).unwrap();
    store.put("x", "1").unwrap();
    store.put("x", "2").unwrap();
    store.close().unwrap();

    let reopened = KvStore::open(&config).unwrap();
    assert_eq!(reopened.get("x").unwrap(), "2");
    assert_eq!(reopened.last_sequence(), 2);
}

#[test]
fn test_file_restart_restores_latest_value() {
    let temp_dir = TempDir::new().unwrap();
    restart_restores_latest_value(file_config(&temp_dir));
}

#[test]
fn test_sqlite_restart_restores_latest_value() {
    let temp_dir = TempDir::new().unwrap();
    restart_restores_latest_value(sqlite_config(&temp_dir));
}

fn full_history_survives_restarts(config: Config) {
    {
        let store = KvStore::open(&config).unwrap();
        store.put("a", "1").unwrap();
        store.put("b", "two words").unwrap();
        store.put("c", "line\nbreak\ttab").unwrap();
        store.delete("a").unwrap();
        // Dropped without close: Drop flushes and closes the journal
    }
    {
        let store = KvStore::open(&config).unwrap();
        assert!(matches!(store.get("a"), Err(KvError::KeyNotFound)));
        store.put("a", "again").unwrap();
        store.close().unwrap();
    }

    let store = KvStore::open(&config).unwrap();
    assert_eq!(
        store.snapshot(),
        vec![
            ("a".to_string(), "again".to_string()),
            ("b".to_string(), "two words".to_string()),
            ("c".to_string(), "line\nbreak\ttab".to_string()),
        ]
    );
    assert_eq!(store.last_sequence(), 5);
}

#[test]
fn test_file_history_survives_restarts() {
    let temp_dir = TempDir::new().unwrap();
    full_history_survives_restarts(file_config(&temp_dir));
}

#[test]
fn test_sqlite_history_survives_restarts() {
    let temp_dir = TempDir::new().unwrap();
    full_history_survives_restarts(sqlite_config(&temp_dir));
}

#[test]
fn test_batched_sync_flushes_on_close() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .log_path(temp_dir.path().join("batched.journal"))
        .wal_sync_strategy(WalSyncStrategy::EveryNEntries { count: 100 })
        .build();

    let store = KvStore::open(&config).unwrap();
    for i in 0..10 {
        store.put(&format!("k{}", i), "v").unwrap();
    }
    store.close().unwrap();

    let reopened = KvStore::open(&config).unwrap();
    assert_eq!(reopened.len(), 10);
}

#[test]
fn test_concurrent_writers_then_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = file_config(&temp_dir);

    let store = Arc::new(KvStore::open(&config).unwrap());
    let mut handles = Vec::new();
    for t in 0..4 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                store.put(&format!("t{}:{}", t, i), &i.to_string()).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    let before = store.snapshot();
    store.close().unwrap();

    let reopened = KvStore::open(&config).unwrap();
    assert_eq!(reopened.snapshot(), before);
    assert_eq!(reopened.last_sequence(), 100);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupt_file_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = file_config(&temp_dir);

    let store = KvStore::open(&config).unwrap();
    store.put("a", "1").unwrap();
    store.close().unwrap();

    let mut file = OpenOptions::new().append(true).open(&config.log_path).unwrap();
    file.write_all(b"not\ta\trecord\n").unwrap();
    drop(file);

    assert!(matches!(
        KvStore::open(&config),
        Err(KvError::CorruptRecord { .. })
    ));
}

#[test]
fn test_out_of_order_file_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = file_config(&temp_dir);
    fs::create_dir_all(config.log_path.parent().unwrap()).unwrap();
    fs::write(&config.log_path, "5\t2\ta\t1\n4\t2\tb\t2\n").unwrap();

    assert!(matches!(
        KvStore::open(&config),
        Err(KvError::OutOfSequence { previous: 5, found: 4 })
    ));
}

#[test]
fn test_invalid_config_refuses_to_open() {
    let config = Config::builder().journal_capacity(0).build();
    assert!(matches!(KvStore::open(&config), Err(KvError::Config(_))));
}
