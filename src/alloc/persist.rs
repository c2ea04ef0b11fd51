//! Free-list persistence across clean shutdowns
//!
//! ## File Format
//! ```text
//! ┌──────────┬─────────────────────────────────────┐
//! │ CRC (4)  │ bincode(PersistedFreeLists)         │
//! └──────────┴─────────────────────────────────────┘
//! ```
//! The file is only trusted when the header is marked clean and the
//! recorded commit matches; it is removed as soon as it has been loaded.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::platform;

use super::FreeList;

/// Snapshot of both free lists at close
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFreeLists {
    /// Header commit the lists belong to
    pub commit: u64,
    pub index: FreeList,
    pub data: FreeList,
}

impl PersistedFreeLists {
    /// Write the snapshot and sync it
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = bincode::serialize(self)?;
        let crc = crc32fast::hash(&body);

        let mut file = fs::File::create(path)?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&body)?;
        platform::durable_sync(&file)?;

        debug!(
            path = ?path,
            index_regions = self.index.len(),
            data_regions = self.data.len(),
            "saved free lists"
        );
        Ok(())
    }

    /// Load a snapshot written for `commit`
    ///
    /// A missing, damaged or mismatched file yields `Ok(None)`; the caller
    /// then rebuilds the lists from the trie.
    pub fn load(path: &Path, commit: u64) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() < 4 {
            warn!(path = ?path, "free list file truncated");
            return Ok(None);
        }
        let stored = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if crc32fast::hash(&bytes[4..]) != stored {
            warn!(path = ?path, "free list file failed checksum");
            return Ok(None);
        }

        let lists: PersistedFreeLists = match bincode::deserialize(&bytes[4..]) {
            Ok(lists) => lists,
            Err(e) => {
                warn!(path = ?path, error = %e, "free list file unreadable");
                return Ok(None);
            }
        };
        if lists.commit != commit {
            warn!(
                path = ?path,
                expected = commit,
                found = lists.commit,
                "free list file belongs to another commit"
            );
            return Ok(None);
        }
        Ok(Some(lists))
    }

    /// Remove the file if present
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
