//! Allocator Module
//!
//! Free-space management for the index and data files.
//!
//! ## Responsibilities
//! - Best-fit reuse of reclaimed regions, keyed by size
//! - Bump allocation (and file growth) when nothing fits
//! - Deferred reclamation gated by reader pins and durability
//! - Persisting free lists across clean shutdowns
//!
//! All sizes are rounded up to [`ALIGNMENT`] so any freed region can
//! hold any record of the same rounded size.

mod free_list;
mod persist;
mod reclaim;

pub use free_list::{Allocator, FreeList};
pub use persist::PersistedFreeLists;
pub use reclaim::{PinGuard, ReaderPins, Region, RetiredBatch, RetiredQueue};

/// Allocation granularity in both files
pub const ALIGNMENT: u64 = 8;

/// Round `n` up to the allocation granularity
pub const fn align_up(n: u64) -> u64 {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}
