//! Free lists and the per-file allocator

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{RadixError, Result};
use crate::storage::RegionFile;

use super::align_up;

/// Reclaimed regions of one file
///
/// Regions are indexed twice: by offset, so a released region merges with
/// free neighbours, and by `(len, offset)` for best-fit lookup. Only the
/// offset map is serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<u64, u64>", into = "BTreeMap<u64, u64>")]
pub struct FreeList {
    by_offset: BTreeMap<u64, u64>,
    by_size: BTreeSet<(u64, u64)>,
    total_bytes: u64,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a region, merging it with adjacent free regions
    ///
    /// `len` must already be aligned.
    pub fn insert(&mut self, offset: u64, len: u64) {
        if len == 0 {
            return;
        }
        let mut start = offset;
        let mut end = offset + len;

        if let Some((&prev, &prev_len)) = self.by_offset.range(..start).next_back() {
            debug_assert!(prev + prev_len <= start, "free region {} released twice", offset);
            if prev + prev_len == start {
                self.unlink(prev, prev_len);
                start = prev;
            }
        }
        if let Some(&next_len) = self.by_offset.get(&end) {
            self.unlink(end, next_len);
            end += next_len;
        }
        self.link(start, end - start);
    }

    /// Take the smallest region of at least `size` bytes
    ///
    /// Whatever is left over stays on the list.
    pub fn take(&mut self, size: u64) -> Option<u64> {
        let &(len, offset) = self.by_size.range((size, 0)..).next()?;
        self.unlink(offset, len);
        if len > size {
            self.link(offset + size, len - size);
        }
        Some(offset)
    }

    /// Remove the region ending exactly at `end`; returns its offset
    pub fn take_tail(&mut self, end: u64) -> Option<u64> {
        let (&offset, &len) = self.by_offset.range(..end).next_back()?;
        if offset + len != end {
            return None;
        }
        self.unlink(offset, len);
        Some(offset)
    }

    /// Rebuild from the live regions of a file
    ///
    /// Every gap between `start` and `end` not covered by `live` is free.
    /// Overlapping live regions mean the trie is damaged.
    pub fn from_gaps(start: u64, end: u64, live: &mut [(u64, u64)]) -> Result<Self> {
        live.sort_unstable();

        let mut free = FreeList::new();
        let mut cursor = start;
        for &(offset, len) in live.iter() {
            if offset < cursor {
                return Err(RadixError::Corruption(format!(
                    "live region at {} overlaps previous region ending at {}",
                    offset, cursor
                )));
            }
            free.insert(cursor, offset - cursor);
            cursor = offset + len;
        }
        if cursor > end {
            return Err(RadixError::Corruption(format!(
                "live region ends at {} beyond high-water mark {}",
                cursor, end
            )));
        }
        free.insert(cursor, end - cursor);
        Ok(free)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// All regions as `(offset, len)`, ordered by offset
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.by_offset.iter().map(|(&offset, &len)| (offset, len))
    }

    fn link(&mut self, offset: u64, len: u64) {
        self.by_offset.insert(offset, len);
        self.by_size.insert((len, offset));
        self.total_bytes += len;
    }

    fn unlink(&mut self, offset: u64, len: u64) {
        self.by_offset.remove(&offset);
        self.by_size.remove(&(len, offset));
        self.total_bytes -= len;
    }
}

impl From<BTreeMap<u64, u64>> for FreeList {
    fn from(regions: BTreeMap<u64, u64>) -> Self {
        let mut free = FreeList::new();
        for (offset, len) in regions {
            free.insert(offset, len);
        }
        free
    }
}

impl From<FreeList> for BTreeMap<u64, u64> {
    fn from(free: FreeList) -> Self {
        free.by_offset
    }
}

/// Space manager for one region file
///
/// Hands out reclaimed regions first and bumps the high-water mark
/// (growing the file) only when nothing on the free list fits.
#[derive(Debug, Clone)]
pub struct Allocator {
    free: FreeList,
    end: u64,
}

impl Allocator {
    pub fn new(end: u64, free: FreeList) -> Self {
        let mut alloc = Self { free, end };
        alloc.trim_tail();
        alloc
    }

    /// Allocate `size` bytes (rounded up to the alignment)
    pub fn allocate(&mut self, size: u64, file: &RegionFile) -> Result<u64> {
        let size = align_up(size);
        if let Some(offset) = self.free.take(size) {
            trace!(file = file.name(), offset, size, "reused free region");
            return Ok(offset);
        }

        let offset = self.end;
        let new_end = offset.checked_add(size).ok_or(RadixError::OutOfSpace {
            file: file.name(),
            requested: u64::MAX,
            limit: file.max_size(),
        })?;
        file.ensure_capacity(new_end)?;
        self.end = new_end;
        Ok(offset)
    }

    /// Return a region; it may be handed out by the next `allocate`
    ///
    /// Free space that reaches the high-water mark lowers it instead of
    /// staying on the list.
    pub fn release(&mut self, offset: u64, size: u64) {
        self.free.insert(offset, align_up(size));
        self.trim_tail();
    }

    fn trim_tail(&mut self) {
        if let Some(offset) = self.free.take_tail(self.end) {
            trace!(from = self.end, to = offset, "lowered high-water mark");
            self.end = offset;
        }
    }

    /// High-water mark
    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free
    }
}
