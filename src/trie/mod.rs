//! Trie Module
//!
//! On-disk radix (Patricia) trie mapping keys to value descriptors.
//!
//! ## Responsibilities
//! - Node record encoding with per-node checksums
//! - Copy-on-write insert / remove / clear
//! - Exact and longest-prefix lookup, full walks
//!
//! ## Invariants
//! - Edges of a node are sorted and no two share a first byte
//! - Exactly one node per stored key
//! - No value-less node other than the root has fewer than two edges
//!
//! ```text
//!            (root)
//!              │ "r"
//!           (branch)
//!        "om" ╱    ╲ "ub"
//!      (branch)    (branch)
//!   "an" ╱  ╲ "ulus"  "e" ╲ ...
//!     (...)  [leaf]
//! ```

pub mod node;
pub mod reader;
mod writer;

pub use node::{Edge, Node, NodeKind, NodeRef, StoredNode, NULL_NODE};
pub use writer::TrieTxn;
