//! Copy-on-write trie mutation
//!
//! Nodes are never modified in place. Every change writes fresh copies of
//! the nodes on the root-to-target path (children before parents) and
//! retires the records they replace, so a reader holding the old root keeps
//! seeing a complete old trie.

use crate::alloc::{align_up, Allocator, Region};
use crate::data::ValueDescriptor;
use crate::error::Result;
use crate::storage::RegionFile;

use super::node::{read_node, Edge, Node, NodeRef, NULL_NODE};
use super::reader;

/// What became of a node after a key under it was removed
enum Removal {
    /// Neither value nor edges remain
    Gone,
    /// Rewritten at a new offset
    Replaced(NodeRef),
    /// Value-less with a single edge; the parent absorbs the edge
    Merge(Edge),
}

/// One structural change to the trie
///
/// Collects the node regions it allocates and the ones it makes
/// unreachable. [`TrieTxn::abort`] gives the new regions back.
pub struct TrieTxn<'a> {
    index: &'a RegionFile,
    alloc: &'a mut Allocator,
    written: Vec<Region>,
    retired: Vec<Region>,
}

impl<'a> TrieTxn<'a> {
    pub fn new(index: &'a RegionFile, alloc: &'a mut Allocator) -> Self {
        Self {
            index,
            alloc,
            written: Vec::new(),
            retired: Vec::new(),
        }
    }

    /// Map `key` to `value`; returns the new root and the value it replaced
    pub fn insert(
        &mut self,
        root: NodeRef,
        key: &[u8],
        value: ValueDescriptor,
    ) -> Result<(NodeRef, Option<ValueDescriptor>)> {
        let mut path: Vec<(Node, Option<Region>, usize)> = Vec::new();
        let mut current = self.load_or_empty(root)?;
        let mut rest = key;

        let (bottom, bottom_at, previous) = loop {
            let (mut node, at) = current;

            if rest.is_empty() {
                let previous = node.value.replace(value);
                break (node, at, previous);
            }

            let pos = match node.find_edge(rest[0]) {
                Ok(pos) => pos,
                Err(_) => {
                    let leaf = self.write(&Node::leaf(value))?;
                    node.add_edge(Edge {
                        label: rest.to_vec(),
                        child: leaf,
                    });
                    break (node, at, None);
                }
            };

            let label_len = node.edges[pos].label.len();
            let common = common_prefix(&node.edges[pos].label, rest);

            if common == label_len {
                let child_ref = node.edges[pos].child;
                let child = read_node(self.index, child_ref)?;
                path.push((node, at, pos));
                rest = &rest[common..];
                current = (child.node, Some((child_ref, child.size)));
                continue;
            }

            // The key leaves the edge part way along: split it.
            let tail = Edge {
                label: node.edges[pos].label[common..].to_vec(),
                child: node.edges[pos].child,
            };
            let mut mid = Node {
                value: None,
                edges: vec![tail],
            };
            if common == rest.len() {
                mid.value = Some(value);
            } else {
                let leaf = self.write(&Node::leaf(value))?;
                mid.add_edge(Edge {
                    label: rest[common..].to_vec(),
                    child: leaf,
                });
            }
            let mid_ref = self.write(&mid)?;

            let edge = &mut node.edges[pos];
            edge.label.truncate(common);
            edge.child = mid_ref;
            break (node, at, None);
        };

        let mut child_ref = self.replace(&bottom, bottom_at)?;
        while let Some((mut parent, at, pos)) = path.pop() {
            parent.edges[pos].child = child_ref;
            child_ref = self.replace(&parent, at)?;
        }
        Ok((child_ref, previous))
    }

    /// Remove `key`; `None` when it is not stored (nothing is written)
    pub fn remove(
        &mut self,
        root: NodeRef,
        key: &[u8],
    ) -> Result<Option<(NodeRef, ValueDescriptor)>> {
        if root == NULL_NODE {
            return Ok(None);
        }

        let stored = read_node(self.index, root)?;
        let mut node = stored.node;
        let mut at = (root, stored.size);
        let mut path: Vec<(Node, Region, usize)> = Vec::new();
        let mut rest = key;

        while !rest.is_empty() {
            let pos = match node.find_edge(rest[0]) {
                Ok(pos) => pos,
                Err(_) => return Ok(None),
            };
            let label_len = node.edges[pos].label.len();
            if !rest.starts_with(&node.edges[pos].label) {
                return Ok(None);
            }

            let child_ref = node.edges[pos].child;
            let child = read_node(self.index, child_ref)?;
            path.push((node, at, pos));
            rest = &rest[label_len..];
            node = child.node;
            at = (child_ref, child.size);
        }

        let removed = match node.value.take() {
            Some(value) => value,
            None => return Ok(None),
        };

        let mut result = self.settle(node, at, path.is_empty())?;
        while let Some((mut parent, parent_at, pos)) = path.pop() {
            match result {
                Removal::Gone => {
                    parent.edges.remove(pos);
                }
                Removal::Replaced(child) => parent.edges[pos].child = child,
                Removal::Merge(edge) => {
                    let slot = &mut parent.edges[pos];
                    slot.label.extend_from_slice(&edge.label);
                    slot.child = edge.child;
                }
            }
            result = self.settle(parent, parent_at, path.is_empty())?;
        }

        let new_root = match result {
            Removal::Gone => NULL_NODE,
            Removal::Replaced(r) => r,
            Removal::Merge(edge) => self.write(&Node {
                value: None,
                edges: vec![edge],
            })?,
        };
        Ok(Some((new_root, removed)))
    }

    /// Retire every node; returns the values that were reachable
    pub fn clear(&mut self, root: NodeRef) -> Result<Vec<ValueDescriptor>> {
        let mut values = Vec::new();
        let retired = &mut self.retired;
        reader::walk(self.index, root, |at, stored| {
            retired.push((at, stored.size));
            if let Some(value) = stored.node.value {
                values.push(value);
            }
            Ok(())
        })?;
        Ok(values)
    }

    /// Give back everything this change allocated
    pub fn abort(self) {
        for (offset, size) in self.written {
            self.alloc.release(offset, size);
        }
    }

    /// Finish the change: `(written, retired)` node regions
    pub fn finish(self) -> (Vec<Region>, Vec<Region>) {
        (self.written, self.retired)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn load_or_empty(&self, root: NodeRef) -> Result<(Node, Option<Region>)> {
        if root == NULL_NODE {
            return Ok((Node::default(), None));
        }
        let stored = read_node(self.index, root)?;
        Ok((stored.node, Some((root, stored.size))))
    }

    fn write(&mut self, node: &Node) -> Result<NodeRef> {
        let bytes = node.encode();
        let size = align_up(bytes.len() as u64);
        let offset = self.alloc.allocate(size, self.index)?;
        self.written.push((offset, size));
        self.index.write_at(&bytes, offset)?;
        Ok(offset)
    }

    fn replace(&mut self, node: &Node, old: Option<Region>) -> Result<NodeRef> {
        let new_ref = self.write(node)?;
        if let Some(old) = old {
            self.retired.push(old);
        }
        Ok(new_ref)
    }

    /// Decide the fate of a node whose subtree lost a key
    fn settle(&mut self, mut node: Node, at: Region, is_root: bool) -> Result<Removal> {
        self.retired.push(at);

        if node.is_empty() {
            return Ok(Removal::Gone);
        }
        if !is_root && node.value.is_none() && node.edges.len() == 1 {
            return Ok(Removal::Merge(node.edges.swap_remove(0)));
        }
        Ok(Removal::Replaced(self.write(&node)?))
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
