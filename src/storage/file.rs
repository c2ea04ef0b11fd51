//! Region File
//!
//! A growable backing file addressed by byte offset. The writer extends it
//! in fixed chunks up to a configured ceiling; readers use positional reads
//! concurrently with the writer.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::error::{RadixError, Result};

use super::platform;

/// One file of the file set (index or data)
#[derive(Debug)]
pub struct RegionFile {
    /// Short name used in errors and logs ("index", "data")
    name: &'static str,

    path: PathBuf,

    file: File,

    /// Physical length; only the writer changes it
    len: AtomicU64,

    /// Growth ceiling
    max_size: u64,

    /// Growth step
    grow_chunk: u64,

    /// Every `sync` fails while set
    #[cfg(test)]
    fail_syncs: std::sync::atomic::AtomicBool,
}

impl RegionFile {
    /// Create a new file at `path`, failing if it already exists
    pub fn create(
        name: &'static str,
        path: &Path,
        initial_len: u64,
        max_size: u64,
        grow_chunk: u64,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;

        let region = Self {
            name,
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(0),
            max_size,
            grow_chunk,
            #[cfg(test)]
            fail_syncs: Default::default(),
        };
        region.ensure_capacity(initial_len)?;
        Ok(region)
    }

    /// Open an existing file at `path`
    pub fn open(name: &'static str, path: &Path, max_size: u64, grow_chunk: u64) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            name,
            path: path.to_path_buf(),
            file,
            len: AtomicU64::new(len),
            max_size,
            grow_chunk,
            #[cfg(test)]
            fail_syncs: Default::default(),
        })
    }

    /// Read exactly `buf.len()` bytes at `offset`
    ///
    /// Reads that would run past the physical end are reported as
    /// corruption: every offset we follow was handed out below `len`.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let end = offset.checked_add(buf.len() as u64);
        match end {
            Some(end) if end <= self.len() => {}
            _ => {
                return Err(RadixError::Corruption(format!(
                    "{} read of {} bytes at {} past end of file ({})",
                    self.name,
                    buf.len(),
                    offset,
                    self.len()
                )))
            }
        }
        platform::read_exact_at(&self.file, buf, offset)?;
        Ok(())
    }

    /// Write all of `buf` at `offset`; the range must already be allocated
    pub fn write_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        platform::write_all_at(&self.file, buf, offset)?;
        Ok(())
    }

    /// Make sure the file is at least `end` bytes long
    ///
    /// Grows in multiples of the configured chunk, clamped to the ceiling.
    pub fn ensure_capacity(&self, end: u64) -> Result<()> {
        let current = self.len();
        if end <= current {
            return Ok(());
        }
        if end > self.max_size {
            return Err(RadixError::OutOfSpace {
                file: self.name,
                requested: end,
                limit: self.max_size,
            });
        }

        let chunks = (end - current).div_ceil(self.grow_chunk);
        let new_len = current
            .saturating_add(chunks.saturating_mul(self.grow_chunk))
            .min(self.max_size);

        self.file.set_len(new_len)?;
        self.len.store(new_len, Ordering::Release);

        debug!(file = self.name, from = current, to = new_len, "grew region file");
        Ok(())
    }

    /// Cut the file back to `len` bytes; longer requests are ignored
    ///
    /// The caller guarantees nothing at or beyond `len` is still reachable.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let current = self.len();
        if len >= current {
            return Ok(());
        }
        self.file.set_len(len)?;
        self.len.store(len, Ordering::Release);
        self.sync()?;

        debug!(file = self.name, from = current, to = len, "truncated region file");
        Ok(())
    }

    /// Flush written bytes to stable storage
    pub fn sync(&self) -> Result<()> {
        self.injected_failure()?;
        platform::durable_sync(&self.file)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_syncs(&self, on: bool) {
        self.fail_syncs.store(on, Ordering::Release);
    }

    #[cfg(test)]
    fn injected_failure(&self) -> Result<()> {
        if self.fail_syncs.load(Ordering::Acquire) {
            return Err(RadixError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{} sync failed", self.name),
            )));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn injected_failure(&self) -> Result<()> {
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}
