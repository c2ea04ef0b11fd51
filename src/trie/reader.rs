//! Trie traversal
//!
//! Pure functions over an index file and a root; they never allocate index
//! space. Callers are responsible for pinning the generation the root was
//! taken from.

use std::collections::HashSet;

use crate::data::ValueDescriptor;
use crate::error::{RadixError, Result};
use crate::storage::RegionFile;

use super::node::{read_node, NodeRef, StoredNode, NULL_NODE};

/// Exact-match lookup
pub fn lookup(index: &RegionFile, root: NodeRef, key: &[u8]) -> Result<Option<ValueDescriptor>> {
    let mut at = root;
    let mut rest = key;

    // Every edge consumes at least one byte, so this terminates.
    loop {
        if at == NULL_NODE {
            return Ok(None);
        }
        let node = read_node(index, at)?.node;

        if rest.is_empty() {
            return Ok(node.value);
        }

        let edge = match node.find_edge(rest[0]) {
            Ok(pos) => &node.edges[pos],
            Err(_) => return Ok(None),
        };
        if !rest.starts_with(&edge.label) {
            return Ok(None);
        }
        rest = &rest[edge.label.len()..];
        at = edge.child;
    }
}

/// Value of the longest stored key that is a prefix of `key`
///
/// Returns the length of that key alongside its value.
pub fn longest_prefix(
    index: &RegionFile,
    root: NodeRef,
    key: &[u8],
) -> Result<Option<(usize, ValueDescriptor)>> {
    let mut best = None;
    let mut at = root;
    let mut consumed = 0;

    while at != NULL_NODE {
        let node = read_node(index, at)?.node;
        if let Some(value) = node.value {
            best = Some((consumed, value));
        }

        let rest = &key[consumed..];
        if rest.is_empty() {
            break;
        }
        let edge = match node.find_edge(rest[0]) {
            Ok(pos) => &node.edges[pos],
            Err(_) => break,
        };
        if !rest.starts_with(&edge.label) {
            break;
        }
        consumed += edge.label.len();
        at = edge.child;
    }
    Ok(best)
}

/// Visit every node reachable from `root`, parents before children
///
/// A node reachable twice means the structure is damaged.
pub fn walk<F>(index: &RegionFile, root: NodeRef, mut visit: F) -> Result<()>
where
    F: FnMut(NodeRef, &StoredNode) -> Result<()>,
{
    if root == NULL_NODE {
        return Ok(());
    }

    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(at) = stack.pop() {
        if !seen.insert(at) {
            return Err(RadixError::Corruption(format!(
                "node at {} is reachable more than once",
                at
            )));
        }
        let stored = read_node(index, at)?;
        visit(at, &stored)?;
        stack.extend(stored.node.edges.iter().rev().map(|e| e.child));
    }
    Ok(())
}
