//! Trie node records
//!
//! ## Record Format
//! ```text
//! ┌─────────┬──────────┬────────────┬──────────────┐
//! │ Kind(1) │ Rsvd (1) │ Edges (2)  │ Rec Len (4)  │
//! ├─────────┴──────────┴────────────┴──────────────┤
//! │ Value descriptor (24, Leaf / BranchWithValue)  │
//! │ ┌────────────┬─────────┬──────────┬──────────┐ │
//! │ │ Offset (8) │ Len (4) │ Rsvd (4) │ Seq (8)  │ │
//! │ └────────────┴─────────┴──────────┴──────────┘ │
//! ├────────────────────────────────────────────────┤
//! │ Edge (repeated, sorted by first label byte)    │
//! │ ┌──────────────┬───────────┬─────────────────┐ │
//! │ │ LabelLen (2) │ Child (8) │  Label bytes    │ │
//! │ └──────────────┴───────────┴─────────────────┘ │
//! ├────────────────────────────────────────────────┤
//! │ CRC32 of everything above (4)                  │
//! └────────────────────────────────────────────────┘
//! ```

use crate::alloc::align_up;
use crate::data::ValueDescriptor;
use crate::error::{RadixError, Result};
use crate::storage::RegionFile;

/// Offset of a node record in the index file
pub type NodeRef = u64;

/// The null reference: an empty trie
pub const NULL_NODE: NodeRef = 0;

const NODE_HEADER: usize = 8;
const VALUE_FIELDS: usize = 24;
const EDGE_HEADER: usize = 10;
const CRC_LEN: usize = 4;

/// Largest record a well-formed node can need
pub const MAX_NODE_SIZE: usize =
    NODE_HEADER + VALUE_FIELDS + 256 * (EDGE_HEADER + u16::MAX as usize) + CRC_LEN;

/// Node shape stored in the kind byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    /// Edges, no value
    Branch = 1,
    /// Value, no edges
    Leaf = 2,
    /// Both
    BranchWithValue = 3,
}

impl NodeKind {
    fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(NodeKind::Branch),
            2 => Some(NodeKind::Leaf),
            3 => Some(NodeKind::BranchWithValue),
            _ => None,
        }
    }

    fn has_value(self) -> bool {
        matches!(self, NodeKind::Leaf | NodeKind::BranchWithValue)
    }
}

/// Labelled edge to a child node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub label: Vec<u8>,
    pub child: NodeRef,
}

/// In-memory form of a node record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub value: Option<ValueDescriptor>,
    /// Sorted by first byte, no two sharing one
    pub edges: Vec<Edge>,
}

impl Node {
    pub fn leaf(value: ValueDescriptor) -> Self {
        Self {
            value: Some(value),
            edges: Vec::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match (self.value.is_some(), self.edges.is_empty()) {
            (true, true) => NodeKind::Leaf,
            (true, false) => NodeKind::BranchWithValue,
            (false, _) => NodeKind::Branch,
        }
    }

    /// Neither value nor edges
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.edges.is_empty()
    }

    /// Position of the edge starting with `byte`, or where it would go
    pub fn find_edge(&self, byte: u8) -> std::result::Result<usize, usize> {
        self.edges.binary_search_by_key(&byte, |e| e.label[0])
    }

    /// Insert an edge keeping the order; the first byte must be unused
    pub fn add_edge(&mut self, edge: Edge) {
        match self.find_edge(edge.label[0]) {
            Ok(pos) => self.edges[pos] = edge,
            Err(pos) => self.edges.insert(pos, edge),
        }
    }

    pub fn encoded_len(&self) -> usize {
        let value = if self.value.is_some() { VALUE_FIELDS } else { 0 };
        let edges: usize = self.edges.iter().map(|e| EDGE_HEADER + e.label.len()).sum();
        NODE_HEADER + value + edges + CRC_LEN
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut buf = Vec::with_capacity(len);

        buf.push(self.kind() as u8);
        buf.push(0);
        buf.extend_from_slice(&(self.edges.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(len as u32).to_le_bytes());

        if let Some(value) = &self.value {
            buf.extend_from_slice(&value.offset.to_le_bytes());
            buf.extend_from_slice(&value.len.to_le_bytes());
            buf.extend_from_slice(&[0u8; 4]);
            buf.extend_from_slice(&value.seq.to_le_bytes());
        }

        for edge in &self.edges {
            buf.extend_from_slice(&(edge.label.len() as u16).to_le_bytes());
            buf.extend_from_slice(&edge.child.to_le_bytes());
            buf.extend_from_slice(&edge.label);
        }

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_HEADER + CRC_LEN {
            return Err(corrupt("node record truncated"));
        }
        let record_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
        if record_len != buf.len() {
            return Err(corrupt("node record length mismatch"));
        }

        let body = &buf[..buf.len() - CRC_LEN];
        let stored = u32::from_le_bytes([
            buf[body.len()],
            buf[body.len() + 1],
            buf[body.len() + 2],
            buf[body.len() + 3],
        ]);
        if crc32fast::hash(body) != stored {
            return Err(corrupt("node checksum mismatch"));
        }

        let kind = NodeKind::from_u8(buf[0]).ok_or_else(|| corrupt("unknown node kind"))?;
        let edge_count = u16::from_le_bytes([buf[2], buf[3]]) as usize;

        let mut reader = FieldReader::new(body, NODE_HEADER);
        let value = if kind.has_value() {
            let offset = reader.u64()?;
            let len = reader.u32()?;
            reader.skip(4)?;
            let seq = reader.u64()?;
            Some(ValueDescriptor { offset, len, seq })
        } else {
            None
        };

        let mut edges: Vec<Edge> = Vec::with_capacity(edge_count);
        for _ in 0..edge_count {
            let label_len = reader.u16()? as usize;
            let child = reader.u64()?;
            let label = reader.bytes(label_len)?.to_vec();

            if label.is_empty() || child == NULL_NODE {
                return Err(corrupt("edge with empty label or null child"));
            }
            if let Some(prev) = edges.last() {
                if prev.label[0] >= label[0] {
                    return Err(corrupt("edges out of order"));
                }
            }
            edges.push(Edge { label, child });
        }

        if !reader.at_end() {
            return Err(corrupt("trailing bytes in node record"));
        }

        let node = Node { value, edges };
        let shape_ok = match kind {
            NodeKind::Leaf => node.edges.is_empty(),
            NodeKind::Branch | NodeKind::BranchWithValue => !node.edges.is_empty(),
        };
        if !shape_ok {
            return Err(corrupt("node kind does not match its contents"));
        }
        Ok(node)
    }
}

/// A node as read from disk, with the space its record occupies
#[derive(Debug, Clone)]
pub struct StoredNode {
    pub node: Node,
    pub size: u64,
}

/// Read and verify the node record at `at`
pub fn read_node(file: &RegionFile, at: NodeRef) -> Result<StoredNode> {
    if at == NULL_NODE {
        return Err(corrupt("null node reference followed"));
    }

    let mut head = [0u8; NODE_HEADER];
    file.read_at(&mut head, at)?;
    let record_len = u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize;
    if !(NODE_HEADER + CRC_LEN..=MAX_NODE_SIZE).contains(&record_len) {
        return Err(RadixError::Corruption(format!(
            "node at {} claims impossible length {}",
            at, record_len
        )));
    }

    let mut buf = vec![0u8; record_len];
    buf[..NODE_HEADER].copy_from_slice(&head);
    file.read_at(&mut buf[NODE_HEADER..], at + NODE_HEADER as u64)?;

    let node = Node::decode(&buf).map_err(|e| match e {
        RadixError::Corruption(msg) => RadixError::Corruption(format!("node at {}: {}", at, msg)),
        other => other,
    })?;

    Ok(StoredNode {
        node,
        size: align_up(record_len as u64),
    })
}

fn corrupt(msg: &str) -> RadixError {
    RadixError::Corruption(msg.to_string())
}

/// Bounds-checked little-endian field reader
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| corrupt("node field runs past record end"))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.bytes(n).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(b);
        Ok(u64::from_le_bytes(out))
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }
}
