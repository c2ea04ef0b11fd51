//! Tests for on-disk integrity
//!
//! These tests verify:
//! - Header slots alternate and the newest valid one wins
//! - A damaged newest slot falls back to the previous commit
//! - Unreadable or newer-format file sets are refused
//! - Damaged trie nodes and value records surface as Corruption

use std::fs;
use std::path::Path;

use radixkv::data::DATA_START;
use radixkv::header::{Header, FORMAT_VERSION, HEADER_AREA, SLOT_SIZE};
use radixkv::storage::RegionFile;
use radixkv::{Config, Database, ErrorCode, RadixError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn writer_config(path: &Path) -> Config {
    Config::builder().data_dir(path).build()
}

fn reader_config(path: &Path) -> Config {
    Config::builder().data_dir(path).read_only().build()
}

/// Create a closed file set holding `key0`..`key{n-1}`
fn setup_closed_db(n: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(writer_config(temp_dir.path())).unwrap();
    for i in 0..n {
        db.add(format!("key{}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }
    db.close().unwrap();
    temp_dir
}

fn index_file(path: &Path) -> RegionFile {
    RegionFile::open("index", &path.join("radix.idx"), u64::MAX, 4096).unwrap()
}

fn latest_header(path: &Path) -> Header {
    Header::read_latest(&index_file(path)).unwrap()
}

/// XOR every byte of `file` in `range`
fn damage(file: &Path, start: u64, end: u64) {
    let mut bytes = fs::read(file).unwrap();
    for b in &mut bytes[start as usize..end as usize] {
        *b ^= 0x5A;
    }
    fs::write(file, &bytes).unwrap();
}

// =============================================================================
// Header Slot Tests
// =============================================================================

#[test]
fn test_commits_alternate_slots() {
    let temp = TempDir::new().unwrap();
    let db = Database::open(writer_config(temp.path())).unwrap();

    let mut slots = Vec::new();
    for i in 0..4 {
        db.add(format!("k{}", i).as_bytes(), b"v").unwrap();
        slots.push(latest_header(temp.path()).slot_offset());
    }

    assert_eq!(slots[0], slots[2]);
    assert_eq!(slots[1], slots[3]);
    assert_ne!(slots[0], slots[1]);
}

#[test]
fn test_clean_close_sets_flag() {
    let temp = setup_closed_db(3);

    let header = latest_header(temp.path());

    assert!(header.is_clean());
    assert_eq!(header.key_count, 3);
    assert_eq!(header.format_version, FORMAT_VERSION);
    assert!(temp.path().join("radix.free").exists());
}

#[test]
fn test_open_writer_marks_dirty() {
    let temp = setup_closed_db(1);
    let _db = Database::open(writer_config(temp.path())).unwrap();

    assert!(!latest_header(temp.path()).is_clean());
}

#[test]
fn test_damaged_newest_slot_falls_back() {
    let temp = setup_closed_db(20);
    let newest = latest_header(temp.path());

    damage(
        &temp.path().join("radix.idx"),
        newest.slot_offset() + 24,
        newest.slot_offset() + 32,
    );

    let previous = latest_header(temp.path());
    assert_eq!(previous.commit, newest.commit - 1);
    assert!(!previous.is_clean());

    // the previous commit describes the same trie, so nothing is lost
    let db = Database::open(writer_config(temp.path())).unwrap();
    assert_eq!(db.count(), 20);
    for i in 0..20 {
        assert_eq!(
            db.find(format!("key{}", i).as_bytes()).unwrap(),
            Some(format!("value{}", i).into_bytes())
        );
    }
    db.add(b"after-recovery", b"ok").unwrap();
    assert_eq!(db.find(b"after-recovery").unwrap(), Some(b"ok".to_vec()));
}

#[test]
fn test_both_slots_damaged() {
    let temp = setup_closed_db(5);

    damage(&temp.path().join("radix.idx"), 16, 24);
    damage(&temp.path().join("radix.idx"), SLOT_SIZE + 16, SLOT_SIZE + 24);

    let err = Database::open(writer_config(temp.path())).unwrap_err();
    assert!(matches!(err, RadixError::Corruption(_)));
    assert_eq!(err.code(), ErrorCode::Corruption);
}

#[test]
fn test_newer_format_is_refused() {
    let temp = setup_closed_db(2);
    let index = index_file(temp.path());
    let mut header = Header::read_latest(&index).unwrap();
    header.format_version = FORMAT_VERSION + 1;
    header.commit += 1;
    header.write(&index).unwrap();
    drop(index);

    let err = Database::open(writer_config(temp.path())).unwrap_err();

    assert!(matches!(
        err,
        RadixError::VersionMismatch { found, supported } if found == FORMAT_VERSION + 1 && supported == FORMAT_VERSION
    ));
    assert_eq!(err.code(), ErrorCode::VersionMismatch);
}

#[test]
fn test_damaged_data_preamble() {
    let temp = setup_closed_db(2);

    damage(&temp.path().join("radix.dat"), 0, 8);

    let err = Database::open(reader_config(temp.path())).unwrap_err();
    assert!(matches!(err, RadixError::Corruption(_)));
}

// =============================================================================
// Record Integrity Tests
// =============================================================================

#[test]
fn test_damaged_value_record() {
    let temp = setup_closed_db(4);
    let header = latest_header(temp.path());

    damage(&temp.path().join("radix.dat"), DATA_START, header.data_end);

    let db = Database::open(reader_config(temp.path())).unwrap();
    let err = db.find(b"key1").unwrap_err();
    assert!(matches!(err, RadixError::Corruption(_)));

    // absence is still decided by the trie alone
    assert_eq!(db.find(b"missing").unwrap(), None);
}

#[test]
fn test_damaged_trie_node() {
    let temp = setup_closed_db(4);
    let header = latest_header(temp.path());

    damage(&temp.path().join("radix.idx"), HEADER_AREA, header.index_end);

    let db = Database::open(reader_config(temp.path())).unwrap();
    assert!(matches!(db.find(b"key1"), Err(RadixError::Corruption(_))));
    assert!(matches!(
        db.find_longest_prefix(b"key1"),
        Err(RadixError::Corruption(_))
    ));
}

#[test]
fn test_damaged_trie_blocks_rebuild() {
    let temp = setup_closed_db(4);
    let index = index_file(temp.path());
    let mut header = Header::read_latest(&index).unwrap();
    header.set_flag(radixkv::header::FLAG_CLEAN, false);
    header.commit += 1;
    header.write(&index).unwrap();
    drop(index);

    damage(&temp.path().join("radix.idx"), HEADER_AREA, header.index_end);

    let err = Database::open(writer_config(temp.path())).unwrap_err();
    assert!(matches!(err, RadixError::Corruption(_)));
}
