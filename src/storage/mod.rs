//! Storage Module
//!
//! File-level plumbing underneath the trie and the data area.
//!
//! ## Responsibilities
//! - Growable region files addressed by byte offset
//! - Positional reads/writes that do not disturb concurrent readers
//! - Durable sync and advisory locking per platform
//!
//! ## File Set
//! ```text
//! {data_dir}/
//! ┌────────────────────────────────────────┐
//! │ radix.idx                              │
//! │ ┌──────────────┬─────────────────────┐ │
//! │ │ Header slots │  Trie node records  │ │
//! │ │  (2 x 128)   │  (8-byte aligned)   │ │
//! │ └──────────────┴─────────────────────┘ │
//! ├────────────────────────────────────────┤
//! │ radix.dat                              │
//! │ ┌──────────────┬─────────────────────┐ │
//! │ │ Preamble(64) │  Value records      │ │
//! │ └──────────────┴─────────────────────┘ │
//! ├────────────────────────────────────────┤
//! │ radix.free  (free lists, clean close)  │
//! │ radix.lck   (advisory lock)            │
//! └────────────────────────────────────────┘
//! ```

mod file;
pub mod platform;

pub use file::RegionFile;
pub use platform::{LockFile, LockLevel};
