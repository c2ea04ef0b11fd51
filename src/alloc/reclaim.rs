//! Deferred reclamation
//!
//! A region retired by the mutation that produced generation `g` was still
//! reachable from every state before `g`. It is handed back to the
//! allocator only once
//! 1. no reader is pinned at a generation below `g`, and
//! 2. the on-disk header has reached generation `g`.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

/// `(offset, len)` of a retired region
pub type Region = (u64, u64);

/// Generations currently being read, with a count per generation
#[derive(Debug, Default)]
pub struct ReaderPins {
    pins: Mutex<BTreeMap<u64, usize>>,
}

impl ReaderPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `generation` until the guard drops
    pub fn pin(&self, generation: u64) -> PinGuard<'_> {
        *self.pins.lock().entry(generation).or_insert(0) += 1;
        PinGuard {
            pins: self,
            generation,
        }
    }

    /// Lowest pinned generation, if any reader is active
    pub fn oldest(&self) -> Option<u64> {
        self.pins.lock().keys().next().copied()
    }

    /// Number of in-flight readers
    pub fn active(&self) -> usize {
        self.pins.lock().values().sum()
    }

    fn unpin(&self, generation: u64) {
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(&generation) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&generation);
            }
        }
    }
}

/// Holds a reader pin
#[derive(Debug)]
pub struct PinGuard<'a> {
    pins: &'a ReaderPins,
    generation: u64,
}

impl PinGuard<'_> {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.pins.unpin(self.generation);
    }
}

/// Regions retired by one mutation
#[derive(Debug, Default, Clone)]
pub struct RetiredBatch {
    pub generation: u64,
    pub index: Vec<Region>,
    pub data: Vec<Region>,
}

impl RetiredBatch {
    fn bytes(&self) -> u64 {
        self.index.iter().chain(self.data.iter()).map(|r| r.1).sum()
    }
}

/// Retired batches in generation order, waiting to become reusable
#[derive(Debug, Default)]
pub struct RetiredQueue {
    batches: VecDeque<RetiredBatch>,
    bytes: u64,
}

impl RetiredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: RetiredBatch) {
        if batch.index.is_empty() && batch.data.is_empty() {
            return;
        }
        debug_assert!(self
            .batches
            .back()
            .map_or(true, |b| b.generation <= batch.generation));
        self.bytes += batch.bytes();
        self.batches.push_back(batch);
    }

    /// Pop every batch that is safe to reuse
    pub fn drain_ready(&mut self, oldest_pin: Option<u64>, durable: u64) -> Vec<RetiredBatch> {
        let mut ready = Vec::new();
        while let Some(front) = self.batches.front() {
            let g = front.generation;
            if g > durable || oldest_pin.is_some_and(|pin| pin < g) {
                break;
            }
            if let Some(batch) = self.batches.pop_front() {
                self.bytes -= batch.bytes();
                ready.push(batch);
            }
        }
        ready
    }

    /// Bytes still waiting for readers or a flush
    pub fn pending_bytes(&self) -> u64 {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
