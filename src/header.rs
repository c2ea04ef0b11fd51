//! Header / Superblock
//!
//! Fixed-size metadata at the start of the index file, written into one of
//! two alternating slots so that a torn header write never destroys the
//! last committed state.
//!
//! ## Slot Format (128 bytes, little-endian)
//! ```text
//! ┌──────────┬─────────┬───────┬──────────┬────────┬────────────┐
//! │ Magic(8) │ Ver (2) │ Flg(2)│ Rsvd (4) │Commit 8│ Generation │
//! ├──────────┴─┬───────┴───────┴──┬───────┴────────┼────────────┤
//! │  Root (8)  │  Key count (8)   │ Index end (8)  │Data end (8)│
//! ├────────────┴──────────────────┴────────────────┴────────────┤
//! │ CRC32 over bytes 0..64 (4)  │  zero padding                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `commit` increases on every header write and picks the slot
//! (`commit % 2`); `generation` counts applied mutations and only moves
//! when the trie changes.

use crate::error::{RadixError, Result};
use crate::storage::RegionFile;

/// Magic bytes identifying a radixkv index file
pub const MAGIC: [u8; 8] = *b"RADIXKV\0";

/// Newest on-disk format this build reads and writes
pub const FORMAT_VERSION: u16 = 1;

/// Size of one header slot
pub const SLOT_SIZE: u64 = 128;

/// Bytes reserved for both slots; trie nodes start here
pub const HEADER_AREA: u64 = 2 * SLOT_SIZE;

/// Set while the writer was in async mode
pub const FLAG_ASYNC: u16 = 0x0001;

/// Set by a clean close; cleared when a writer attaches
pub const FLAG_CLEAN: u16 = 0x0002;

const CRC_OFFSET: usize = 64;

/// Decoded header slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format_version: u16,
    pub flags: u16,
    pub commit: u64,
    pub generation: u64,
    /// Offset of the root node, 0 when the trie is empty
    pub root: u64,
    pub key_count: u64,
    /// High-water mark of the index file
    pub index_end: u64,
    /// High-water mark of the data file
    pub data_end: u64,
}

impl Header {
    /// Header of a freshly created file set
    pub fn new(data_end: u64) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            flags: FLAG_CLEAN,
            commit: 0,
            generation: 0,
            root: 0,
            key_count: 0,
            index_end: HEADER_AREA,
            data_end,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.flags & FLAG_CLEAN != 0
    }

    pub fn is_async(&self) -> bool {
        self.flags & FLAG_ASYNC != 0
    }

    pub fn set_flag(&mut self, flag: u16, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Offset of the slot this header is written to
    pub fn slot_offset(&self) -> u64 {
        (self.commit % 2) * SLOT_SIZE
    }

    pub fn to_bytes(&self) -> [u8; SLOT_SIZE as usize] {
        let mut buf = [0u8; SLOT_SIZE as usize];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..10].copy_from_slice(&self.format_version.to_le_bytes());
        buf[10..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..24].copy_from_slice(&self.commit.to_le_bytes());
        buf[24..32].copy_from_slice(&self.generation.to_le_bytes());
        buf[32..40].copy_from_slice(&self.root.to_le_bytes());
        buf[40..48].copy_from_slice(&self.key_count.to_le_bytes());
        buf[48..56].copy_from_slice(&self.index_end.to_le_bytes());
        buf[56..64].copy_from_slice(&self.data_end.to_le_bytes());

        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < SLOT_SIZE as usize {
            return Err(RadixError::Corruption("header slot truncated".into()));
        }
        if buf[0..8] != MAGIC {
            return Err(RadixError::Corruption("bad header magic".into()));
        }

        let stored_crc = u32::from_le_bytes(read_array(buf, CRC_OFFSET));
        let actual_crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        if stored_crc != actual_crc {
            return Err(RadixError::Corruption(format!(
                "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, actual_crc
            )));
        }

        let format_version = u16::from_le_bytes(read_array(buf, 8));
        if format_version > FORMAT_VERSION {
            return Err(RadixError::VersionMismatch {
                found: format_version,
                supported: FORMAT_VERSION,
            });
        }

        Ok(Self {
            format_version,
            flags: u16::from_le_bytes(read_array(buf, 10)),
            commit: u64::from_le_bytes(read_array(buf, 16)),
            generation: u64::from_le_bytes(read_array(buf, 24)),
            root: u64::from_le_bytes(read_array(buf, 32)),
            key_count: u64::from_le_bytes(read_array(buf, 40)),
            index_end: u64::from_le_bytes(read_array(buf, 48)),
            data_end: u64::from_le_bytes(read_array(buf, 56)),
        })
    }

    /// Load the newest valid slot
    ///
    /// A slot from a newer format wins over any checksum problem so the
    /// caller sees `VersionMismatch` rather than `Corruption`.
    pub fn read_latest(file: &RegionFile) -> Result<Self> {
        let mut best: Option<Header> = None;
        let mut first_error: Option<RadixError> = None;

        for slot in 0..2 {
            let mut buf = [0u8; SLOT_SIZE as usize];
            file.read_at(&mut buf, slot * SLOT_SIZE)?;

            match Header::from_bytes(&buf) {
                Ok(header) => {
                    if best.map_or(true, |b| header.commit > b.commit) {
                        best = Some(header);
                    }
                }
                Err(err @ RadixError::VersionMismatch { .. }) => return Err(err),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match best {
            Some(header) => {
                if let Some(err) = first_error {
                    tracing::debug!(error = %err, commit = header.commit, "ignoring stale header slot");
                }
                Ok(header)
            }
            None => Err(first_error
                .unwrap_or_else(|| RadixError::Corruption("no valid header slot".into()))),
        }
    }

    /// Write into this header's slot and sync
    ///
    /// Callers bump `commit` first so the other slot keeps the previous
    /// state until this write is durable.
    pub fn write(&self, file: &RegionFile) -> Result<()> {
        file.write_at(&self.to_bytes(), self.slot_offset())?;
        file.sync()
    }
}

fn read_array<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}
