//! Snapshot Backup
//!
//! Copies one pinned snapshot of a file set into a fresh directory. Only
//! records reachable from the snapshot's root are copied, packed from the
//! start of each file, so the copy is also compacted and carries no free
//! space.
//!
//! ```text
//!  source                          destination
//!  radix.idx ──walk from root──►   radix.idx.tmp ─┐
//!  radix.dat ──copy values────►    radix.dat.tmp ─┤ sync, rename
//!                                  radix.free    ─┘ (empty lists, clean commit)
//! ```
//!
//! Nodes are written children first, the same order the writer uses, and
//! the index is renamed into place last: a crash part way leaves no index
//! and the next open of the destination starts from scratch.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::alloc::{Allocator, FreeList, PersistedFreeLists};
use crate::config::Config;
use crate::data::{self, ValueDescriptor, DATA_START};
use crate::engine::Engine;
use crate::error::{RadixError, Result};
use crate::header::{Header, HEADER_AREA};
use crate::storage::RegionFile;
use crate::trie::node::read_node;
use crate::trie::{Node, NodeRef, NULL_NODE};

/// What a finished backup holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Generation of the copied snapshot
    pub generation: u64,
    pub keys: u64,
    pub nodes: u64,
    /// High-water mark of the copied index
    pub index_bytes: u64,
    /// High-water mark of the copied data file
    pub data_bytes: u64,
}

/// Copy the trie under `root` and every value it reaches into `dest`
///
/// `dest` must not already hold a file set.
pub fn copy_snapshot(
    index: &RegionFile,
    data: &RegionFile,
    root: NodeRef,
    generation: u64,
    dest: &Path,
    config: &Config,
) -> Result<BackupReport> {
    fs::create_dir_all(dest)?;
    let index_path = dest.join(Engine::INDEX_FILENAME);
    let data_path = dest.join(Engine::DATA_FILENAME);
    if index_path.exists() {
        return Err(RadixError::InvalidArgument(format!(
            "{:?} already holds a file set",
            dest
        )));
    }

    let index_tmp = dest.join(format!("{}.tmp", Engine::INDEX_FILENAME));
    let data_tmp = dest.join(format!("{}.tmp", Engine::DATA_FILENAME));
    for stale in [&index_tmp, &data_tmp, &data_path] {
        if stale.exists() {
            warn!(path = ?stale, "removing leftover from an interrupted backup");
            fs::remove_file(stale)?;
        }
    }

    let mut copy = SnapshotCopy {
        src_index: index,
        src_data: data,
        index: RegionFile::create("index", &index_tmp, HEADER_AREA, config.index_max_size, config.grow_chunk)?,
        data: RegionFile::create("data", &data_tmp, DATA_START, config.data_max_size, config.grow_chunk)?,
        index_alloc: Allocator::new(HEADER_AREA, FreeList::new()),
        data_alloc: Allocator::new(DATA_START, FreeList::new()),
        value_buf: Vec::new(),
        keys: 0,
        nodes: 0,
    };
    copy.data.write_at(&data::preamble(), 0)?;

    let new_root = copy.copy_trie(root)?;

    let mut header = Header::new(DATA_START);
    header.generation = generation;
    header.root = new_root;
    header.key_count = copy.keys;
    header.index_end = copy.index_alloc.end();
    header.data_end = copy.data_alloc.end();

    copy.data.sync()?;
    copy.index.sync()?;
    header.write(&copy.index)?;

    let report = BackupReport {
        generation,
        keys: copy.keys,
        nodes: copy.nodes,
        index_bytes: header.index_end,
        data_bytes: header.data_end,
    };
    drop(copy);

    PersistedFreeLists {
        commit: header.commit,
        index: FreeList::new(),
        data: FreeList::new(),
    }
    .save(&dest.join(Engine::FREE_FILENAME))?;
    fs::rename(&data_tmp, &data_path)?;
    fs::rename(&index_tmp, &index_path)?;

    debug!(dest = ?dest, nodes = report.nodes, keys = report.keys, "snapshot copied");
    Ok(report)
}

/// Destination files plus bump allocators over them
struct SnapshotCopy<'a> {
    src_index: &'a RegionFile,
    src_data: &'a RegionFile,
    index: RegionFile,
    data: RegionFile,
    index_alloc: Allocator,
    data_alloc: Allocator,
    value_buf: Vec<u8>,
    keys: u64,
    nodes: u64,
}

/// A source node whose children are being copied
struct Frame {
    node: Node,
    /// Next edge whose child still has to be copied
    next: usize,
}

impl SnapshotCopy<'_> {
    /// Copy the trie post-order; returns the new root
    fn copy_trie(&mut self, root: NodeRef) -> Result<NodeRef> {
        if root == NULL_NODE {
            return Ok(NULL_NODE);
        }

        let mut seen = HashSet::new();
        seen.insert(root);
        let mut stack = vec![Frame {
            node: read_node(self.src_index, root)?.node,
            next: 0,
        }];

        while let Some(top) = stack.last_mut() {
            if let Some(edge) = top.node.edges.get(top.next) {
                let child = edge.child;
                if !seen.insert(child) {
                    return Err(RadixError::Corruption(format!(
                        "node at {} is reachable more than once",
                        child
                    )));
                }
                let node = read_node(self.src_index, child)?.node;
                stack.push(Frame { node, next: 0 });
                continue;
            }

            let Some(mut frame) = stack.pop() else { break };
            if let Some(value) = frame.node.value {
                frame.node.value = Some(self.copy_value(&value)?);
            }
            let at = self.write_node(&frame.node)?;

            match stack.last_mut() {
                Some(parent) => {
                    parent.node.edges[parent.next].child = at;
                    parent.next += 1;
                }
                None => return Ok(at),
            }
        }

        Err(RadixError::Corruption("trie copy ended without a root".into()))
    }

    /// Copy one value record, checking it on the way
    fn copy_value(&mut self, value: &ValueDescriptor) -> Result<ValueDescriptor> {
        data::read_value_into(self.src_data, value, &mut self.value_buf)?;

        let size = value.record_size();
        let offset = self.data_alloc.allocate(size, &self.data)?;
        self.data
            .write_at(&data::encode_record(&self.value_buf, value.seq), offset)?;

        self.keys += 1;
        Ok(ValueDescriptor { offset, ..*value })
    }

    fn write_node(&mut self, node: &Node) -> Result<NodeRef> {
        let bytes = node.encode();
        let offset = self.index_alloc.allocate(bytes.len() as u64, &self.index)?;
        self.index.write_at(&bytes, offset)?;

        self.nodes += 1;
        Ok(offset)
    }
}
