//! # radixkv
//!
//! An embedded, file-backed key-value store keyed by arbitrary byte strings:
//! - On-disk radix (Patricia) trie index with a separate value area
//! - One writer (sync or async queue) and lock-free concurrent readers
//! - Copy-on-write updates with double-slotted headers for crash safety
//! - Deferred space reclamation gated by reader pins and durability
//! - Online snapshot backups and tail shrinking
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Database handles / status-code API              │
//! │          (shared per directory via process registry)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Writer    │          │   Readers   │
//!   │ (sync/async)│          │ (pin + gen) │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │     published root / generation, reclamation, flushing       │
//! └──────┬──────────────────┬──────────────────┬────────────────┘
//!        ▼                  ▼                  ▼
//!  ┌───────────┐     ┌─────────────┐    ┌─────────────┐
//!  │   Trie    │     │  Data area  │    │  Allocator  │
//!  │ radix.idx │     │  radix.dat  │    │ free lists  │
//!  └───────────┘     └─────────────┘    └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod header;
pub mod alloc;
pub mod data;
pub mod trie;
pub mod engine;
pub mod backup;
pub mod writer;
pub mod db;
pub mod api;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorCode, RadixError, Result};
pub use config::{AccessMode, Config, WriteMode};
pub use db::Database;
pub use backup::BackupReport;
pub use engine::Stats;
pub use writer::{Ack, Mutation, Outcome, Ticket};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of radixkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
