//! Tests for the status-code API
//!
//! These tests verify:
//! - The open/add/find/remove/close cycle in both writer modes
//! - Status codes for missing keys and bad arguments
//! - QueryResult reuse across lookups

use radixkv::api::{self, QueryResult, ASYNC_WRITER, SYNC_WRITER};
use radixkv::ErrorCode;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const OK: i32 = 0;
const NOT_FOUND: i32 = 1;

fn path_of(temp: &TempDir) -> String {
    temp.path().join("db").to_string_lossy().into_owned()
}

fn add_str(handle: &api::Handle, key: &str, value: &str) -> i32 {
    api::add(handle, key.as_bytes(), key.len(), value.as_bytes(), value.len())
}

fn find_str(handle: &api::Handle, key: &str, result: &mut QueryResult) -> i32 {
    api::find(handle, key.as_bytes(), key.len(), result)
}

fn remove_str(handle: &api::Handle, key: &str) -> i32 {
    api::remove(handle, key.as_bytes(), key.len())
}

/// Insert, look up and remove TEST_KEY_0..TEST_KEY_99 through the API
fn run_hundred_keys(mode: i32) {
    let temp = TempDir::new().unwrap();
    let handle = api::open(&path_of(&temp), mode).unwrap();
    let mut result = QueryResult::new();

    for i in 0..100 {
        assert_eq!(add_str(&handle, &format!("TEST_KEY_{}", i), &format!("TEST_VAL_{}", i)), OK);
    }
    handle.database().flush().unwrap();

    for i in 0..100 {
        assert_eq!(find_str(&handle, &format!("TEST_KEY_{}", i), &mut result), OK);
        let expected = format!("TEST_VAL_{}", i);
        assert_eq!(result.data(), expected.as_bytes());
        assert_eq!(result.data_len(), expected.len());
    }

    for i in 0..100 {
        assert_eq!(remove_str(&handle, &format!("TEST_KEY_{}", i)), OK);
    }
    handle.database().flush().unwrap();

    for i in 0..100 {
        assert_eq!(find_str(&handle, &format!("TEST_KEY_{}", i), &mut result), NOT_FOUND);
        assert_eq!(result.data_len(), 0);
    }

    assert_eq!(api::close(handle), OK);
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[test]
fn test_hundred_keys_sync() {
    run_hundred_keys(SYNC_WRITER);
}

#[test]
fn test_hundred_keys_async() {
    run_hundred_keys(ASYNC_WRITER);
}

#[test]
fn test_reopen_after_close() {
    let temp = TempDir::new().unwrap();
    let handle = api::open(&path_of(&temp), ASYNC_WRITER).unwrap();
    assert_eq!(add_str(&handle, "persist", "me"), OK);
    assert_eq!(api::close(handle), OK);

    let handle = api::open(&path_of(&temp), SYNC_WRITER).unwrap();
    let mut result = QueryResult::new();
    assert_eq!(find_str(&handle, "persist", &mut result), OK);
    assert_eq!(result.data(), b"me");
    assert_eq!(api::close(handle), OK);
}

// =============================================================================
// Status Code Tests
// =============================================================================

#[test]
fn test_invalid_mode() {
    let temp = TempDir::new().unwrap();

    let err = api::open(&path_of(&temp), 7).unwrap_err();

    assert_eq!(err, ErrorCode::InvalidArgument.as_i32());
    assert_eq!(ErrorCode::from_i32(err), Some(ErrorCode::InvalidArgument));
}

#[test]
fn test_second_writer_is_busy() {
    let temp = TempDir::new().unwrap();
    let first = api::open(&path_of(&temp), SYNC_WRITER).unwrap();

    let err = api::open(&path_of(&temp), SYNC_WRITER).unwrap_err();

    assert_eq!(err, ErrorCode::Busy.as_i32());
    assert_eq!(api::close(first), OK);
}

#[test]
fn test_lengths_beyond_buffers() {
    let temp = TempDir::new().unwrap();
    let handle = api::open(&path_of(&temp), SYNC_WRITER).unwrap();
    let mut result = QueryResult::new();
    let invalid = ErrorCode::InvalidArgument.as_i32();

    assert_eq!(api::add(&handle, b"key", 4, b"value", 5), invalid);
    assert_eq!(api::add(&handle, b"key", 3, b"value", 6), invalid);
    assert_eq!(api::find(&handle, b"key", 9, &mut result), invalid);
    assert_eq!(api::remove(&handle, b"key", 9), invalid);

    // shorter lengths use a prefix of the buffers
    assert_eq!(api::add(&handle, b"keyXXX", 3, b"valueXXX", 5), OK);
    assert_eq!(find_str(&handle, "key", &mut result), OK);
    assert_eq!(result.data(), b"value");
}

#[test]
fn test_remove_missing_key() {
    let temp = TempDir::new().unwrap();
    let handle = api::open(&path_of(&temp), SYNC_WRITER).unwrap();

    assert_eq!(remove_str(&handle, "ghost"), NOT_FOUND);
    assert_eq!(add_str(&handle, "ghost", "boo"), OK);
    assert_eq!(remove_str(&handle, "ghost"), OK);
    assert_eq!(remove_str(&handle, "ghost"), NOT_FOUND);
}

#[test]
fn test_query_result_reuse() {
    let temp = TempDir::new().unwrap();
    let handle = api::open(&path_of(&temp), SYNC_WRITER).unwrap();
    let mut result = QueryResult::new();
    add_str(&handle, "long", "a much longer value");
    add_str(&handle, "short", "tiny");

    assert_eq!(find_str(&handle, "long", &mut result), OK);
    assert_eq!(find_str(&handle, "short", &mut result), OK);
    assert_eq!(result.data(), b"tiny");
    assert_eq!(result.data_len(), 4);

    assert_eq!(find_str(&handle, "absent", &mut result), NOT_FOUND);
    assert!(result.data().is_empty());
}

#[test]
fn test_empty_key_and_value() {
    let temp = TempDir::new().unwrap();
    let handle = api::open(&path_of(&temp), SYNC_WRITER).unwrap();
    let mut result = QueryResult::new();

    assert_eq!(api::add(&handle, b"", 0, b"", 0), OK);
    assert_eq!(api::find(&handle, b"", 0, &mut result), OK);
    assert_eq!(result.data_len(), 0);
}
