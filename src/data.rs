//! Data Area
//!
//! Value payloads live in `radix.dat`, one record per live value. Records
//! are written once into unreferenced space and never modified in place.
//!
//! ## Record Format
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────┬─────────┐
//! │ Len (4)  │ CRC (4)  │ Seq (8)  │   Value bytes   │ Padding │
//! └──────────┴──────────┴──────────┴─────────────────┴─────────┘
//! ```
//! The CRC covers `Seq` and the value bytes. `Seq` is the generation of the
//! mutation that wrote the record and must match the descriptor that points
//! at it.

use crate::alloc::align_up;
use crate::error::{RadixError, Result};
use crate::storage::RegionFile;

/// Magic bytes at the start of the data file
pub const DATA_MAGIC: [u8; 8] = *b"RADIXDAT";

/// Size of the data file preamble; the first record starts here
pub const DATA_START: u64 = 64;

/// Bytes in front of every value
pub const RECORD_HEADER: usize = 16;

/// Reference from a trie node to a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueDescriptor {
    pub offset: u64,
    pub len: u32,
    pub seq: u64,
}

impl ValueDescriptor {
    /// Bytes the record occupies in the data file
    pub fn record_size(&self) -> u64 {
        record_size(self.len as usize)
    }
}

/// Aligned on-disk size of a record holding `value_len` bytes
pub fn record_size(value_len: usize) -> u64 {
    align_up((RECORD_HEADER + value_len) as u64)
}

/// Encode a value record (unpadded)
pub fn encode_record(value: &[u8], seq: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER + value.len());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(&record_crc(seq, value).to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(value);
    buf
}

fn record_crc(seq: u64, value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&seq.to_le_bytes());
    hasher.update(value);
    hasher.finalize()
}

/// Read the value behind `desc` into `out`, replacing its contents
pub fn read_value_into(file: &RegionFile, desc: &ValueDescriptor, out: &mut Vec<u8>) -> Result<()> {
    let mut head = [0u8; RECORD_HEADER];
    file.read_at(&mut head, desc.offset)?;

    let len = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    let crc = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&head[8..16]);
    let seq = u64::from_le_bytes(seq_bytes);

    if len != desc.len || seq != desc.seq {
        return Err(RadixError::Corruption(format!(
            "value record at {} is (len {}, seq {}), expected (len {}, seq {})",
            desc.offset, len, seq, desc.len, desc.seq
        )));
    }

    out.clear();
    out.resize(len as usize, 0);
    file.read_at(out, desc.offset + RECORD_HEADER as u64)?;

    if record_crc(seq, out) != crc {
        return Err(RadixError::Corruption(format!(
            "value record at {} failed checksum",
            desc.offset
        )));
    }
    Ok(())
}

/// Preamble written once when the data file is created
pub fn preamble() -> [u8; DATA_START as usize] {
    let mut buf = [0u8; DATA_START as usize];
    buf[0..8].copy_from_slice(&DATA_MAGIC);
    buf[8..10].copy_from_slice(&crate::header::FORMAT_VERSION.to_le_bytes());
    buf
}

/// Check the data file preamble
pub fn check_preamble(file: &RegionFile) -> Result<()> {
    let mut buf = [0u8; DATA_START as usize];
    file.read_at(&mut buf, 0)?;

    if buf[0..8] != DATA_MAGIC {
        return Err(RadixError::Corruption("bad data file magic".into()));
    }
    let version = u16::from_le_bytes([buf[8], buf[9]]);
    if version > crate::header::FORMAT_VERSION {
        return Err(RadixError::VersionMismatch {
            found: version,
            supported: crate::header::FORMAT_VERSION,
        });
    }
    Ok(())
}
