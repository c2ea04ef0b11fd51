//! Tests for the allocator, free lists and region files
//!
//! These tests verify:
//! - Bump allocation grows the backing file in chunks
//! - Released regions are reused best-fit before the file grows
//! - The size ceiling yields OutOfSpace
//! - Rebuilding free lists from live regions
//! - Free-list snapshots are only trusted for their own commit

use std::path::PathBuf;

use radixkv::alloc::{align_up, Allocator, FreeList, PersistedFreeLists, ReaderPins, RetiredBatch, RetiredQueue};
use radixkv::storage::RegionFile;
use radixkv::RadixError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const START: u64 = 64;
const CHUNK: u64 = 4096;

fn setup_temp_file(max_size: u64) -> (TempDir, RegionFile) {
    let temp_dir = TempDir::new().unwrap();
    let file = RegionFile::create("data", &temp_dir.path().join("region"), START, max_size, CHUNK)
        .unwrap();
    (temp_dir, file)
}

fn free_path(temp: &TempDir) -> PathBuf {
    temp.path().join("radix.free")
}

// =============================================================================
// Region File Tests
// =============================================================================

#[test]
fn test_create_sets_initial_length() {
    let (_temp, file) = setup_temp_file(1 << 20);

    assert_eq!(file.len(), CHUNK);
    assert_eq!(file.name(), "data");
}

#[test]
fn test_read_past_end_is_corruption() {
    let (_temp, file) = setup_temp_file(1 << 20);
    let mut buf = [0u8; 16];

    let err = file.read_at(&mut buf, file.len() - 8).unwrap_err();

    assert!(matches!(err, RadixError::Corruption(_)));
}

#[test]
fn test_growth_is_clamped_to_ceiling() {
    let (_temp, file) = setup_temp_file(CHUNK + 100);

    file.ensure_capacity(CHUNK + 1).unwrap();
    assert_eq!(file.len(), CHUNK + 100);

    let err = file.ensure_capacity(CHUNK + 101).unwrap_err();
    assert!(matches!(err, RadixError::OutOfSpace { file: "data", .. }));
}

// =============================================================================
// Allocator Tests
// =============================================================================

#[test]
fn test_allocate_bumps_and_aligns() {
    let (_temp, file) = setup_temp_file(1 << 20);
    let mut alloc = Allocator::new(START, FreeList::new());

    let a = alloc.allocate(10, &file).unwrap();
    let b = alloc.allocate(8, &file).unwrap();

    assert_eq!(a, START);
    assert_eq!(b, START + align_up(10));
    assert_eq!(alloc.end(), START + 16 + 8);
}

#[test]
fn test_allocate_grows_file() {
    let (_temp, file) = setup_temp_file(1 << 20);
    let mut alloc = Allocator::new(START, FreeList::new());

    let offset = alloc.allocate(3 * CHUNK, &file).unwrap();

    assert_eq!(offset, START);
    assert!(file.len() >= START + 3 * CHUNK);
    assert_eq!(file.len() % CHUNK, 0);
}

#[test]
fn test_release_then_reuse() {
    let (_temp, file) = setup_temp_file(1 << 20);
    let mut alloc = Allocator::new(START, FreeList::new());

    let a = alloc.allocate(100, &file).unwrap();
    let _b = alloc.allocate(100, &file).unwrap();
    let end = alloc.end();

    alloc.release(a, 100);
    let c = alloc.allocate(100, &file).unwrap();

    assert_eq!(c, a);
    assert_eq!(alloc.end(), end);
    assert!(alloc.free_list().is_empty());
}

#[test]
fn test_best_fit_with_split() {
    let (_temp, file) = setup_temp_file(1 << 20);
    let mut alloc = Allocator::new(START, FreeList::new());

    let big = alloc.allocate(256, &file).unwrap();
    let _gap1 = alloc.allocate(8, &file).unwrap();
    let small = alloc.allocate(64, &file).unwrap();
    let _gap2 = alloc.allocate(8, &file).unwrap();
    alloc.release(big, 256);
    alloc.release(small, 64);

    // 48 fits both holes; the 64-byte one is the better fit
    let first = alloc.allocate(48, &file).unwrap();
    assert_eq!(first, small);
    assert_eq!(alloc.free_list().total_bytes(), 256 + 16);

    // 200 only fits the big hole
    let second = alloc.allocate(200, &file).unwrap();
    assert_eq!(second, big);
    assert_eq!(alloc.free_list().total_bytes(), 56 + 16);
}

#[test]
fn test_out_of_space_leaves_allocator_unchanged() {
    let (_temp, file) = setup_temp_file(CHUNK);
    let mut alloc = Allocator::new(START, FreeList::new());

    let err = alloc.allocate(CHUNK, &file).unwrap_err();

    assert!(matches!(err, RadixError::OutOfSpace { .. }));
    assert_eq!(alloc.end(), START);
    assert!(alloc.allocate(64, &file).is_ok());
}

// =============================================================================
// Free List Rebuild Tests
// =============================================================================

#[test]
fn test_from_gaps() {
    let mut live = vec![(200, 50), (100, 40), (300, 8)];

    let free = FreeList::from_gaps(64, 400, &mut live).unwrap();

    let mut regions: Vec<(u64, u64)> = free.iter().collect();
    regions.sort_unstable();
    assert_eq!(regions, vec![(64, 36), (140, 60), (250, 50), (308, 92)]);
    assert_eq!(free.total_bytes(), 36 + 60 + 50 + 92);
}

#[test]
fn test_from_gaps_rejects_overlap() {
    let mut live = vec![(100, 64), (150, 16)];

    let err = FreeList::from_gaps(64, 400, &mut live).unwrap_err();

    assert!(matches!(err, RadixError::Corruption(_)));
}

#[test]
fn test_from_gaps_rejects_region_past_end() {
    let mut live = vec![(380, 64)];

    assert!(FreeList::from_gaps(64, 400, &mut live).is_err());
}

// =============================================================================
// Reclamation Tests
// =============================================================================

#[test]
fn test_retired_batches_wait_for_durability() {
    let mut queue = RetiredQueue::new();
    queue.push(RetiredBatch {
        generation: 5,
        index: vec![(256, 40)],
        data: vec![(64, 24)],
    });

    assert!(queue.drain_ready(None, 4).is_empty());
    assert_eq!(queue.pending_bytes(), 64);

    let ready = queue.drain_ready(None, 5);
    assert_eq!(ready.len(), 1);
    assert!(queue.is_empty());
    assert_eq!(queue.pending_bytes(), 0);
}

#[test]
fn test_retired_batches_wait_for_readers() {
    let pins = ReaderPins::new();
    let mut queue = RetiredQueue::new();
    for generation in 1..=3 {
        queue.push(RetiredBatch {
            generation,
            index: vec![(generation * 100, 8)],
            data: Vec::new(),
        });
    }

    let guard = pins.pin(2);
    assert_eq!(pins.oldest(), Some(2));

    // a reader on generation 2 still reaches what generation 3 retired
    let ready = queue.drain_ready(pins.oldest(), 3);
    assert_eq!(ready.iter().map(|b| b.generation).collect::<Vec<_>>(), vec![1, 2]);

    drop(guard);
    assert_eq!(pins.active(), 0);
    assert_eq!(queue.drain_ready(pins.oldest(), 3).len(), 1);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_persisted_lists_roundtrip_for_commit() {
    let temp = TempDir::new().unwrap();
    let mut index = FreeList::new();
    index.insert(512, 48);
    let mut data = FreeList::new();
    data.insert(64, 128);
    data.insert(1024, 16);
    let lists = PersistedFreeLists {
        commit: 9,
        index,
        data,
    };

    lists.save(&free_path(&temp)).unwrap();

    assert_eq!(PersistedFreeLists::load(&free_path(&temp), 9).unwrap(), Some(lists));
    assert_eq!(PersistedFreeLists::load(&free_path(&temp), 10).unwrap(), None);
}

#[test]
fn test_persisted_lists_ignore_damage() {
    let temp = TempDir::new().unwrap();
    let lists = PersistedFreeLists {
        commit: 1,
        index: FreeList::new(),
        data: FreeList::new(),
    };
    lists.save(&free_path(&temp)).unwrap();

    let mut bytes = std::fs::read(free_path(&temp)).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(free_path(&temp), &bytes).unwrap();

    assert_eq!(PersistedFreeLists::load(&free_path(&temp), 1).unwrap(), None);
    assert_eq!(PersistedFreeLists::load(&temp.path().join("missing"), 1).unwrap(), None);

    PersistedFreeLists::remove(&free_path(&temp)).unwrap();
    PersistedFreeLists::remove(&free_path(&temp)).unwrap();
    assert!(!free_path(&temp).exists());
}
