//! Tests for the async writer
//!
//! These tests verify:
//! - Mutations apply in submission order
//! - Tickets, wait_for and cancellation
//! - Bounded queue back-pressure (QueueFull)
//! - Failures surface on wait_for / flush
//! - Close drains or discards the queue

use std::path::Path;
use std::time::Duration;

use radixkv::{Ack, Config, Database, Mutation, RadixError, Ticket, WriteMode};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn async_config(path: &Path) -> Config {
    Config::builder()
        .data_dir(path)
        .write_mode(WriteMode::Async)
        .build()
}

fn setup_async_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(async_config(temp_dir.path())).unwrap();
    (temp_dir, db)
}

fn ticket(ack: Ack) -> Ticket {
    ack.ticket().cloned().expect("async writer hands out tickets")
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_async_add_and_find() {
    let (_temp, db) = setup_async_db();

    let ack = db.add(b"hello", b"world").unwrap();
    assert!(ack.outcome().is_none());
    db.wait_for(ticket(ack).seq()).unwrap();

    assert_eq!(db.find(b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn test_later_write_wins() {
    let (_temp, db) = setup_async_db();

    for i in 0..1000 {
        db.add(b"same-key", format!("version-{}", i).as_bytes()).unwrap();
    }
    db.flush().unwrap();

    assert_eq!(db.find(b"same-key").unwrap(), Some(b"version-999".to_vec()));
    assert_eq!(db.count(), 1);
}

#[test]
fn test_interleaved_add_and_remove() {
    let (_temp, db) = setup_async_db();

    for i in 0..100 {
        let key = format!("key{}", i % 10);
        db.add(key.as_bytes(), b"v").unwrap();
        if i % 3 == 0 {
            db.remove(key.as_bytes()).unwrap();
        }
    }
    db.flush().unwrap();

    // the last operation on each key decides whether it exists
    for k in 0..10 {
        let last_i = 90 + k;
        let expected = if last_i % 3 == 0 { None } else { Some(b"v".to_vec()) };
        assert_eq!(db.find(format!("key{}", k).as_bytes()).unwrap(), expected);
    }
}

#[test]
fn test_hundred_keys_scenario_async() {
    let (_temp, db) = setup_async_db();

    for i in 0..100 {
        db.add(format!("TEST_KEY_{}", i).as_bytes(), format!("TEST_VAL_{}", i).as_bytes())
            .unwrap();
    }
    db.flush().unwrap();
    for i in 0..100 {
        assert_eq!(
            db.find(format!("TEST_KEY_{}", i).as_bytes()).unwrap(),
            Some(format!("TEST_VAL_{}", i).into_bytes())
        );
    }

    for i in 0..100 {
        db.remove(format!("TEST_KEY_{}", i).as_bytes()).unwrap();
    }
    db.flush().unwrap();
    for i in 0..100 {
        assert_eq!(db.find(format!("TEST_KEY_{}", i).as_bytes()).unwrap(), None);
    }
}

#[test]
fn test_remove_all_is_ordered() {
    let (_temp, db) = setup_async_db();

    db.add(b"before", b"1").unwrap();
    db.remove_all().unwrap();
    db.add(b"after", b"2").unwrap();
    db.flush().unwrap();

    assert_eq!(db.find(b"before").unwrap(), None);
    assert_eq!(db.find(b"after").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.count(), 1);
}

// =============================================================================
// Ticket Tests
// =============================================================================

#[test]
fn test_ticket_sequence_increases() {
    let (_temp, db) = setup_async_db();

    let seqs: Vec<u64> = (0..10)
        .map(|i| ticket(db.add(format!("k{}", i).as_bytes(), b"v").unwrap()).seq())
        .collect();

    for pair in seqs.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }

    db.wait_for(seqs[9]).unwrap();
    for i in 0..10 {
        assert!(db.contains(format!("k{}", i).as_bytes()).unwrap());
    }
    assert_eq!(db.stats().durable_generation, db.generation());
}

#[test]
fn test_wait_for_unissued_sequence() {
    let (_temp, db) = setup_async_db();

    let seq = ticket(db.add(b"only", b"1").unwrap()).seq();

    let err = db.wait_for(seq + 1).unwrap_err();
    assert!(matches!(err, RadixError::InvalidArgument(_)));
    db.wait_for(seq).unwrap();
    assert!(db.contains(b"only").unwrap());
}

#[test]
fn test_wait_for_earlier_ticket() {
    let (_temp, db) = setup_async_db();

    let first = ticket(db.add(b"first", b"1").unwrap());
    db.add(b"second", b"2").unwrap();

    db.wait_for(first.seq()).unwrap();
    assert_eq!(db.find(b"first").unwrap(), Some(b"1".to_vec()));
    assert!(first.is_taken());
}

#[test]
fn test_cancel_queued_mutations() {
    let (_temp, db) = setup_async_db();

    let tickets: Vec<Ticket> = (0..2000)
        .map(|i| ticket(db.add(format!("c{}", i).as_bytes(), b"v").unwrap()))
        .collect();
    let cancelled: Vec<bool> = tickets
        .iter()
        .map(|t| t.seq() % 2 == 0 && t.cancel())
        .collect();
    db.flush().unwrap();

    for (i, was_cancelled) in cancelled.iter().enumerate() {
        let present = db.contains(format!("c{}", i).as_bytes()).unwrap();
        assert_eq!(present, !was_cancelled, "key c{}", i);
        assert_eq!(tickets[i].is_cancelled(), *was_cancelled);
    }
}

#[test]
fn test_cancel_after_apply_fails() {
    let (_temp, db) = setup_async_db();

    let t = ticket(db.add(b"k", b"v").unwrap());
    db.flush().unwrap();

    assert!(!t.cancel());
    assert!(t.is_taken());
    assert_eq!(db.find(b"k").unwrap(), Some(b"v".to_vec()));
}

// =============================================================================
// Back-pressure / Error Tests
// =============================================================================

#[test]
fn test_bounded_queue_reports_full() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .write_mode(WriteMode::Async)
        .queue_capacity(Some(1))
        .submit_timeout(Duration::ZERO)
        .build();
    let db = Database::open(config).unwrap();

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for i in 0..500 {
        let key = format!("bp{}", i);
        match db.add(key.as_bytes(), &[0u8; 64]) {
            Ok(_) => accepted.push(key),
            Err(RadixError::QueueFull) => rejected.push(key),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    db.flush().unwrap();

    assert!(!accepted.is_empty());
    for key in &accepted {
        assert!(db.contains(key.as_bytes()).unwrap());
    }
    for key in &rejected {
        assert!(!db.contains(key.as_bytes()).unwrap());
    }
    assert_eq!(db.count(), accepted.len() as u64);
}

#[test]
fn test_insert_new_conflict_surfaces_on_wait() {
    let (_temp, db) = setup_async_db();

    db.insert_new(b"dup", b"first").unwrap();
    let second = ticket(db.insert_new(b"dup", b"second").unwrap());

    let err = db.wait_for(second.seq()).unwrap_err();
    assert!(matches!(err, RadixError::AlreadyExists));

    // reported once; later work proceeds
    db.add(b"other", b"ok").unwrap();
    db.flush().unwrap();
    assert_eq!(db.find(b"dup").unwrap(), Some(b"first".to_vec()));
    assert_eq!(db.find(b"other").unwrap(), Some(b"ok".to_vec()));
}

#[test]
fn test_invalid_mutation_rejected_at_submit() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .write_mode(WriteMode::Async)
        .max_key_len(4)
        .build();
    let db = Database::open(config).unwrap();

    let err = db.submit(Mutation::insert(b"too long", b"v", true)).unwrap_err();

    assert!(matches!(err, RadixError::InvalidArgument(_)));
    db.flush().unwrap();
    assert_eq!(db.count(), 0);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_drains_queue() {
    let temp = TempDir::new().unwrap();
    {
        let db = Database::open(async_config(temp.path())).unwrap();
        for i in 0..1000 {
            db.add(format!("drain{}", i).as_bytes(), b"v").unwrap();
        }
        db.close().unwrap();
    }

    let db = Database::open(async_config(temp.path())).unwrap();
    assert_eq!(db.count(), 1000);
    assert!(db.contains(b"drain999").unwrap());
}

#[test]
fn test_close_without_drain() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp.path())
        .write_mode(WriteMode::Async)
        .drain_on_close(false)
        .build();
    {
        let db = Database::open(config.clone()).unwrap();
        for i in 0..1000 {
            db.add(format!("maybe{}", i).as_bytes(), b"v").unwrap();
        }
        db.close().unwrap();
    }

    let db = Database::open(config).unwrap();
    let count = db.count();
    assert!(count <= 1000);
    // whatever was applied is a prefix of the submission order
    if count > 0 {
        assert!(db.contains(format!("maybe{}", count - 1).as_bytes()).unwrap());
    }
    assert!(!db.contains(format!("maybe{}", count).as_bytes()).unwrap());
}

#[test]
fn test_reader_outlives_writer() {
    let temp = TempDir::new().unwrap();
    let db = Database::open(async_config(temp.path())).unwrap();
    let reader = Database::open(Config::builder().data_dir(temp.path()).read_only().build()).unwrap();
    db.add(b"k", b"v").unwrap();
    db.close().unwrap();

    assert_eq!(reader.find(b"k").unwrap(), Some(b"v".to_vec()));
    assert!(matches!(reader.add(b"k2", b"v"), Err(RadixError::NotAllowed(_))));
}
