//! Tests for the transaction logger
//!
//! These tests verify:
//! - Durability: everything recorded before close replays after reopen
//! - Sequence numbers are strictly increasing and gapless
//! - Numbering continues across restarts
//! - Cold start against a missing file
//! - Concurrent enqueue from many threads
//! - Lifecycle rules (replay once, start once, close drains)
//! - A replay left running across `start` cannot rewind numbering

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use durakv::config::WalSyncStrategy;
use durakv::wal::{Event, EventType, TransactionLogger};
use durakv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("transaction.log");
    (temp_dir, log_path)
}

/// Open, replay fully, start. Returns the logger and the replayed events.
fn open_logger(path: &PathBuf) -> (TransactionLogger, Vec<Event>) {
    let logger = TransactionLogger::open(path, WalSyncStrategy::EveryWrite).unwrap();
    let events = logger
        .replay()
        .unwrap()
        .collect::<durakv::Result<Vec<_>>>()
        .unwrap();
    logger.start().unwrap();
    (logger, events)
}

fn replay_all(path: &PathBuf) -> Vec<Event> {
    let logger = TransactionLogger::open(path, WalSyncStrategy::EveryWrite).unwrap();
    let events = logger
        .replay()
        .unwrap()
        .collect::<durakv::Result<Vec<_>>>()
        .unwrap();
    logger.close().unwrap();
    events
}

fn apply(events: &[Event]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for event in events {
        match event.event_type {
            EventType::Put => {
                map.insert(event.key.clone(), event.value.clone());
            }
            EventType::Delete => {
                map.remove(&event.key);
            }
        }
    }
    map
}

// =============================================================================
// Creation / Cold Start Tests
// =============================================================================

#[test]
fn test_open_creates_log_file() {
    let (_temp, log_path) = setup_temp_log();

    let _logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();

    assert!(log_path.is_file());
}

#[test]
fn test_cold_start_replays_nothing() {
    let (_temp, log_path) = setup_temp_log();

    let (logger, events) = open_logger(&log_path);
    assert!(events.is_empty());
    assert_eq!(logger.last_sequence(), 0);

    assert_eq!(logger.record_put("k", "v").unwrap(), 1);
    logger.flush().unwrap();
    logger.close().unwrap();

    assert_eq!(replay_all(&log_path), vec![Event::put(1, "k", "v")]);
}

// =============================================================================
// Durability / Ordering Tests
// =============================================================================

#[test]
fn test_put_put_scenario() {
    let (_temp, log_path) = setup_temp_log();

    let (logger, _) = open_logger(&log_path);
    logger.record_put("a", "1").unwrap();
    logger.record_put("a", "2").unwrap();
    logger.close().unwrap();

    let events = replay_all(&log_path);
    assert_eq!(events, vec![Event::put(1, "a", "1"), Event::put(2, "a", "2")]);

    let map = apply(&events);
    assert_eq!(map.get("a").map(String::as_str), Some("2"));
}

#[test]
fn test_put_delete_scenario() {
    let (_temp, log_path) = setup_temp_log();

    let (logger, _) = open_logger(&log_path);
    logger.record_put("k", "v").unwrap();
    logger.record_delete("k").unwrap();
    logger.close().unwrap();

    let events = replay_all(&log_path);
    assert_eq!(events, vec![Event::put(1, "k", "v"), Event::delete(2, "k")]);
    assert!(apply(&events).is_empty());
}

#[test]
fn test_close_drains_every_recorded_event() {
    let (_temp, log_path) = setup_temp_log();

    let (logger, _) = open_logger(&log_path);
    let mut expected = Vec::new();
    for i in 0..500u64 {
        let key = format!("key{}", i % 37);
        if i % 5 == 4 {
            let seq = logger.record_delete(&key).unwrap();
            expected.push(Event::delete(seq, key));
        } else {
            let value = format!("value{}", i);
            let seq = logger.record_put(&key, &value).unwrap();
            expected.push(Event::put(seq, key, value));
        }
    }
    // No flush: close alone must not lose anything
    logger.close().unwrap();

    assert_eq!(replay_all(&log_path), expected);
}

#[test]
fn test_sequence_gapless_across_cycles() {
    let (_temp, log_path) = setup_temp_log();

    for cycle in 0..3 {
        let (logger, replayed) = open_logger(&log_path);
        assert_eq!(replayed.len(), cycle * 4);
        for i in 0..4 {
            logger.record_put(&format!("c{}-{}", cycle, i), "x").unwrap();
        }
        logger.close().unwrap();
    }

    let sequences: Vec<u64> = replay_all(&log_path).iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=12).collect::<Vec<u64>>());
}

#[test]
fn test_cross_restart_continuation() {
    let (_temp, log_path) = setup_temp_log();

    {
        let (logger, _) = open_logger(&log_path);
        logger.record_put("my-key", "my-value").unwrap();
        logger.record_put("my-key", "my-value2").unwrap();
        logger.flush().unwrap();
    }

    let (logger, replayed) = open_logger(&log_path);
    assert_eq!(replayed.len(), 2);
    assert_eq!(logger.last_sequence(), 2);

    assert_eq!(logger.record_put("my-key", "my-value3").unwrap(), 3);
    assert_eq!(logger.record_put("my-key2", "my-value4").unwrap(), 4);
    logger.flush().unwrap();
    assert_eq!(logger.last_sequence(), 4);
}

#[test]
fn test_start_without_replay_primes_sequence() {
    let (_temp, log_path) = setup_temp_log();
    {
        let (logger, _) = open_logger(&log_path);
        for i in 0..3 {
            logger.record_put(&format!("k{}", i), "v").unwrap();
        }
    }

    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();
    logger.start().unwrap();
    assert_eq!(logger.last_sequence(), 3);
    assert_eq!(logger.record_delete("k0").unwrap(), 4);
}

#[test]
fn test_partially_consumed_replay_still_primes_on_start() {
    let (_temp, log_path) = setup_temp_log();
    {
        let (logger, _) = open_logger(&log_path);
        for i in 0..5 {
            logger.record_put(&format!("k{}", i), "v").unwrap();
        }
    }

    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();
    let mut replay = logger.replay().unwrap();
    assert!(replay.next().is_some());
    assert!(!replay.is_complete());
    drop(replay);

    logger.start().unwrap();
    assert_eq!(logger.record_put("next", "v").unwrap(), 6);
}

#[test]
fn test_recovers_after_partial_trailing_record() {
    let (_temp, log_path) = setup_temp_log();
    fs::write(&log_path, "1\t1\ta\t1\n2\t1\tb\t2\n3\t1\tc\t").unwrap();

    let (logger, replayed) = open_logger(&log_path);
    assert_eq!(replayed, vec![Event::put(1, "a", "1"), Event::put(2, "b", "2")]);

    assert_eq!(logger.record_put("c", "3").unwrap(), 3);
    logger.close().unwrap();

    let events = replay_all(&log_path);
    assert_eq!(events.len(), 3);
    assert_eq!(events[2], Event::put(3, "c", "3"));
}

#[test]
fn test_replay_reports_partial_tail_before_start_repairs_it() {
    let (_temp, log_path) = setup_temp_log();
    let contents = "1\t1\ta\t1\n2\t1\tb\t";
    fs::write(&log_path, contents).unwrap();

    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();
    let mut replay = logger.replay().unwrap();
    let events = replay
        .by_ref()
        .collect::<durakv::Result<Vec<_>>>()
        .unwrap();
    assert_eq!(events, vec![Event::put(1, "a", "1")]);
    assert!(replay.is_complete());
    assert!(replay.stats().truncated_tail);

    // Untouched until the pipeline starts
    assert_eq!(fs::read_to_string(&log_path).unwrap(), contents);

    logger.start().unwrap();
    assert_eq!(fs::read_to_string(&log_path).unwrap(), "1\t1\ta\t1\n");
}

#[test]
fn test_malformed_log_fails_replay_and_start() {
    let (_temp, log_path) = setup_temp_log();
    fs::write(&log_path, "1\t1\ta\t1\nnot a record\n").unwrap();

    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();
    let results: Vec<_> = logger.replay().unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(KvError::MalformedRecord { line: 2, .. })));

    assert!(logger.start().is_err());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_enqueue_unique_sequences() {
    let (_temp, log_path) = setup_temp_log();

    let (logger, _) = open_logger(&log_path);
    let logger = Arc::new(logger);

    let num_threads = 16;
    let per_thread = 50;
    let mut handles = Vec::new();
    for t in 0..num_threads {
        let logger = Arc::clone(&logger);
        handles.push(thread::spawn(move || {
            (0..per_thread)
                .map(|i| logger.record_put(&format!("t{}-{}", t, i), "v").unwrap())
                .collect::<Vec<u64>>()
        }));
    }

    let mut observed = HashSet::new();
    for handle in handles {
        for seq in handle.join().unwrap() {
            assert!(observed.insert(seq), "sequence {} handed out twice", seq);
        }
    }
    logger.flush().unwrap();

    let total = num_threads * per_thread;
    let events = replay_all(&log_path);
    assert_eq!(events.len(), total);

    // File order equals sequence order, and sequences are gapless
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, (i + 1) as u64);
        assert!(observed.contains(&event.sequence));
    }
    let keys: HashSet<&str> = events.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys.len(), total);
}

#[test]
fn test_per_thread_order_preserved() {
    let (_temp, log_path) = setup_temp_log();

    let (logger, _) = open_logger(&log_path);
    let logger = Arc::new(logger);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..100 {
                    logger.record_put(&format!("t{}", t), &i.to_string()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    logger.close().unwrap();

    let map = apply(&replay_all(&log_path));
    for t in 0..4 {
        assert_eq!(map[&format!("t{}", t)], "99");
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_replay_only_once() {
    let (_temp, log_path) = setup_temp_log();
    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();

    let _ = logger.replay().unwrap().count();
    assert!(matches!(logger.replay(), Err(KvError::InvalidState(_))));
}

#[test]
fn test_replay_after_start_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let (logger, _) = open_logger(&log_path);

    assert!(matches!(logger.replay(), Err(KvError::InvalidState(_))));
}

#[test]
fn test_start_only_once() {
    let (_temp, log_path) = setup_temp_log();
    let (logger, _) = open_logger(&log_path);

    assert!(matches!(logger.start(), Err(KvError::InvalidState(_))));
}

#[test]
fn test_record_before_start_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();

    assert!(matches!(
        logger.record_put("k", "v"),
        Err(KvError::InvalidState(_))
    ));
    assert_eq!(logger.last_sequence(), 0);
    // Nothing queued, so flush has nothing to wait for
    logger.flush().unwrap();
}

#[test]
fn test_empty_key_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let (logger, _) = open_logger(&log_path);

    assert!(matches!(logger.record_put("", "v"), Err(KvError::EmptyKey)));
    assert!(matches!(logger.record_delete(""), Err(KvError::EmptyKey)));
    assert_eq!(logger.last_sequence(), 0);
}

#[test]
fn test_record_after_close_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let (logger, _) = open_logger(&log_path);
    logger.record_put("k", "v").unwrap();
    logger.close().unwrap();

    assert!(matches!(logger.record_put("k", "v2"), Err(KvError::LoggerClosed)));
    assert!(matches!(logger.flush(), Err(KvError::LoggerClosed)));
    assert_eq!(logger.last_sequence(), 1);
}

#[test]
fn test_double_close_is_harmless() {
    let (_temp, log_path) = setup_temp_log();
    let (logger, _) = open_logger(&log_path);
    logger.record_put("k", "v").unwrap();

    logger.close().unwrap();
    logger.close().unwrap();
    drop(logger);

    assert_eq!(replay_all(&log_path), vec![Event::put(1, "k", "v")]);
}

#[test]
fn test_close_without_start() {
    let (_temp, log_path) = setup_temp_log();
    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();

    logger.close().unwrap();
    assert!(matches!(logger.start(), Err(KvError::LoggerClosed)));
}

#[test]
fn test_flush_makes_writes_visible() {
    let (_temp, log_path) = setup_temp_log();
    let logger = TransactionLogger::open(
        &log_path,
        WalSyncStrategy::EveryNEntries { count: 1000 },
    )
    .unwrap();
    logger.start().unwrap();

    logger.record_put("a", "1").unwrap();
    logger.record_put("b", "2").unwrap();
    logger.flush().unwrap();

    assert_eq!(
        fs::read_to_string(&log_path).unwrap(),
        "1\t1\ta\t1\n2\t1\tb\t2\n"
    );
    assert!(!logger.has_failed());
    assert!(logger.take_error().is_none());
}

#[test]
fn test_stale_replay_cannot_rewind_sequence_after_start() {
    let (_temp, log_path) = setup_temp_log();
    {
        let (logger, _) = open_logger(&log_path);
        for i in 0..3 {
            logger.record_put(&format!("k{}", i), "v").unwrap();
        }
    }

    let logger = TransactionLogger::open(&log_path, WalSyncStrategy::EveryWrite).unwrap();
    let mut replay = logger.replay().unwrap();
    assert_eq!(replay.next().unwrap().unwrap().sequence, 1);

    logger.start().unwrap();
    assert_eq!(logger.record_put("x", "1").unwrap(), 4);

    // The leftover iterator is cut off instead of resuming
    assert!(matches!(replay.next(), Some(Err(KvError::InvalidState(_)))));
    assert!(replay.next().is_none());
    assert!(!replay.is_complete());

    assert_eq!(logger.last_sequence(), 4);
    assert_eq!(logger.record_put("y", "2").unwrap(), 5);
    logger.close().unwrap();

    let sequences: Vec<u64> = replay_all(&log_path).iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=5).collect::<Vec<u64>>());
}
