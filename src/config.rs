//! Configuration for radixkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::data::DATA_START;
use crate::error::{RadixError, Result};
use crate::header::HEADER_AREA;

/// Main configuration for a radixkv handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the file set
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── radix.idx        (header slots + trie nodes)
    ///     ├── radix.dat        (value records)
    ///     ├── radix.free       (free lists, only between clean close and reopen)
    ///     └── radix.lck        (advisory lock)
    pub data_dir: PathBuf,

    /// Maximum size the index file may grow to (bytes)
    pub index_max_size: u64,

    /// Maximum size the data file may grow to (bytes)
    pub data_max_size: u64,

    /// Files are extended in steps of this many bytes
    pub grow_chunk: u64,

    // -------------------------------------------------------------------------
    // Access Configuration
    // -------------------------------------------------------------------------
    /// Reader handles cannot mutate; at most one writer handle per file set
    pub access: AccessMode,

    /// How the writer applies mutations
    pub write_mode: WriteMode,

    /// Take an advisory lock on the file set so that other processes
    /// cannot attach a writer alongside us
    pub exclusive: bool,

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------
    /// Longest accepted key (bytes)
    pub max_key_len: usize,

    /// Longest accepted value (bytes)
    pub max_value_len: usize,

    /// Reader restarts before a lookup gives up with `Busy`
    pub read_retry_limit: u32,

    // -------------------------------------------------------------------------
    // Async Writer Configuration
    // -------------------------------------------------------------------------
    /// Bound on queued mutations; `None` means unbounded
    pub queue_capacity: Option<usize>,

    /// How long a submit waits on a full bounded queue before `QueueFull`
    pub submit_timeout: Duration,

    /// Queue depth at which a warning is logged
    pub queue_warn_depth: usize,

    /// Flush after this many applied mutations even if the queue is busy
    pub async_flush_every: usize,

    /// Apply queued mutations on close (otherwise they are discarded)
    pub drain_on_close: bool,
}

/// Whether the handle may mutate the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Writer,
    Reader,
}

/// Writer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Apply and flush inside the submitting call
    Sync,

    /// Queue to a background thread; flushed when the queue runs dry
    /// or every `async_flush_every` mutations
    Async,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./radixkv_data"),
            index_max_size: 4 * 1024 * 1024 * 1024, // 4 GB
            data_max_size: 64 * 1024 * 1024 * 1024, // 64 GB
            grow_chunk: 1024 * 1024,                // 1 MB
            access: AccessMode::Writer,
            write_mode: WriteMode::Sync,
            exclusive: true,
            max_key_len: 256,
            max_value_len: 16 * 1024 * 1024, // 16 MB
            read_retry_limit: 64,
            queue_capacity: None,
            submit_timeout: Duration::from_secs(1),
            queue_warn_depth: 2048,
            async_flush_every: 256,
            drain_on_close: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the on-disk format cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.max_key_len == 0 || self.max_key_len > u16::MAX as usize {
            return Err(RadixError::Config(format!(
                "max_key_len must be in 1..={}, got {}",
                u16::MAX,
                self.max_key_len
            )));
        }
        if self.max_value_len > u32::MAX as usize {
            return Err(RadixError::Config(format!(
                "max_value_len must be at most {}, got {}",
                u32::MAX,
                self.max_value_len
            )));
        }
        if self.grow_chunk == 0 {
            return Err(RadixError::Config("grow_chunk must be non-zero".into()));
        }
        if self.index_max_size <= HEADER_AREA {
            return Err(RadixError::Config(format!(
                "index_max_size must exceed the {} byte header area",
                HEADER_AREA
            )));
        }
        if self.data_max_size <= DATA_START {
            return Err(RadixError::Config(format!(
                "data_max_size must exceed the {} byte data preamble",
                DATA_START
            )));
        }
        if self.queue_capacity == Some(0) {
            return Err(RadixError::Config("queue_capacity must be non-zero".into()));
        }
        if self.async_flush_every == 0 {
            return Err(RadixError::Config("async_flush_every must be non-zero".into()));
        }
        if self.read_retry_limit == 0 {
            return Err(RadixError::Config("read_retry_limit must be non-zero".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the maximum index file size (in bytes)
    pub fn index_max_size(mut self, size: u64) -> Self {
        self.config.index_max_size = size;
        self
    }

    /// Set the maximum data file size (in bytes)
    pub fn data_max_size(mut self, size: u64) -> Self {
        self.config.data_max_size = size;
        self
    }

    /// Set the file growth step (in bytes)
    pub fn grow_chunk(mut self, size: u64) -> Self {
        self.config.grow_chunk = size;
        self
    }

    pub fn access(mut self, access: AccessMode) -> Self {
        self.config.access = access;
        self
    }

    /// Shorthand for `access(AccessMode::Reader)`
    pub fn read_only(self) -> Self {
        self.access(AccessMode::Reader)
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.config.exclusive = exclusive;
        self
    }

    pub fn max_key_len(mut self, len: usize) -> Self {
        self.config.max_key_len = len;
        self
    }

    pub fn max_value_len(mut self, len: usize) -> Self {
        self.config.max_value_len = len;
        self
    }

    pub fn read_retry_limit(mut self, limit: u32) -> Self {
        self.config.read_retry_limit = limit;
        self
    }

    /// Bound the async queue (`None` for unbounded)
    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    pub fn queue_warn_depth(mut self, depth: usize) -> Self {
        self.config.queue_warn_depth = depth;
        self
    }

    pub fn async_flush_every(mut self, count: usize) -> Self {
        self.config.async_flush_every = count;
        self
    }

    pub fn drain_on_close(mut self, drain: bool) -> Self {
        self.config.drain_on_close = drain;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
