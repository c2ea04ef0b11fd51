//! Database Handle
//!
//! The user-facing handle. Handles opened on the same directory inside one
//! process share a single [`Engine`] through a process-wide registry, so a
//! writer handle and any number of reader handles see the same published
//! state.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::backup::BackupReport;
use crate::config::{AccessMode, Config, WriteMode};
use crate::engine::{Engine, Stats};
use crate::error::{RadixError, Result};
use crate::writer::{Ack, Mutation, Writer};

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<Engine>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<Engine>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Find the live engine for `dir` or open one
fn acquire_engine(dir: &Path, config: &Config) -> Result<Arc<Engine>> {
    let mut engines = registry().lock();
    if let Some(engine) = engines.get(dir).and_then(Weak::upgrade) {
        debug!(dir = ?dir, "sharing open file set");
        return Ok(engine);
    }

    let engine = Arc::new(Engine::open(dir, config)?);
    engines.retain(|_, weak| weak.strong_count() > 0);
    engines.insert(dir.to_path_buf(), Arc::downgrade(&engine));
    Ok(engine)
}

/// Handle on a radixkv file set
///
/// Writer handles own the file set's single writer; reader handles can only
/// look things up.
#[derive(Debug)]
pub struct Database {
    engine: Arc<Engine>,
    writer: Option<Writer>,
    config: Config,
    closed: bool,
}

impl Database {
    /// Open or create a database with the given config
    ///
    /// Reader handles never create anything: a missing file set is
    /// `NoDatabase`. A second writer on the same file set is `Busy`.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        if config.access == AccessMode::Writer {
            fs::create_dir_all(&config.data_dir)?;
        }
        let dir = match fs::canonicalize(&config.data_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RadixError::NoDatabase(config.data_dir.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let engine = acquire_engine(&dir, &config)?;

        let writer = match config.access {
            AccessMode::Writer => {
                engine.attach_writer(config.write_mode)?;
                match Writer::start(Arc::clone(&engine), &config) {
                    Ok(writer) => Some(writer),
                    Err(e) => {
                        if let Err(detach) = engine.detach_writer() {
                            warn!(error = %detach, "detach after failed writer start");
                        }
                        return Err(e);
                    }
                }
            }
            AccessMode::Reader => None,
        };

        info!(
            dir = ?dir,
            access = ?config.access,
            write_mode = ?config.write_mode,
            keys = engine.count(),
            "database opened"
        );

        Ok(Self {
            engine,
            writer,
            config,
            closed: false,
        })
    }

    /// Open a writer with default config in `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert or overwrite `key`
    pub fn add(&self, key: &[u8], value: &[u8]) -> Result<Ack> {
        self.submit(Mutation::insert(key, value, true))
    }

    /// Insert `key` only if absent (`AlreadyExists` otherwise)
    ///
    /// In async mode the check happens on the writer thread and a
    /// conflict surfaces on the next `wait_for` / `flush`.
    pub fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<Ack> {
        self.submit(Mutation::insert(key, value, false))
    }

    /// Remove `key`; removing a missing key reports `Outcome::NotFound`
    pub fn remove(&self, key: &[u8]) -> Result<Ack> {
        self.submit(Mutation::remove(key))
    }

    /// Remove every key
    pub fn remove_all(&self) -> Result<Ack> {
        self.submit(Mutation::RemoveAll)
    }

    /// Submit a prepared mutation
    pub fn submit(&self, mutation: Mutation) -> Result<Ack> {
        match &mutation {
            Mutation::Insert { key, value, .. } => self.check_entry(key, value)?,
            Mutation::Remove { key } => self.check_key(key)?,
            Mutation::RemoveAll => {}
        }
        self.writer()?.submit(mutation)
    }

    /// Block until every mutation submitted through this handle is durable
    pub fn flush(&self) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }

    /// Block until the mutation with submission sequence `seq` is durable
    pub fn wait_for(&self, seq: u64) -> Result<()> {
        self.writer()?.wait_for(seq)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn find(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::new();
        Ok(self.find_into(key, &mut out)?.then_some(out))
    }

    /// Lookup into a caller-provided buffer; returns whether the key exists
    pub fn find_into(&self, key: &[u8], out: &mut Vec<u8>) -> Result<bool> {
        self.check_key(key)?;
        self.engine.lookup_into(key, out)
    }

    /// Longest stored key that is a prefix of `key`
    ///
    /// Returns that key's length and its value.
    pub fn find_longest_prefix(&self, key: &[u8]) -> Result<Option<(usize, Vec<u8>)>> {
        self.engine.longest_prefix(key)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        Ok(self.find(key)?.is_some())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Copy the current contents into a new, compacted file set at `dest`
    ///
    /// Writer handles flush first, so the copy holds everything submitted
    /// through this handle. Reads and writes carry on while it runs.
    pub fn backup(&self, dest: &Path) -> Result<BackupReport> {
        if self.closed {
            return Err(RadixError::Closed);
        }
        self.flush()?;
        self.engine.backup(dest)
    }

    /// Give free space at the end of both files back to the filesystem
    ///
    /// Returns the number of bytes released. Space still reachable by an
    /// active reader stays allocated.
    pub fn shrink(&self) -> Result<u64> {
        self.writer()?.flush()?;
        let engine = &self.engine;
        engine.with_writer(|core| engine.shrink(core))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the handle
    ///
    /// Writers drain (or discard) the async queue, flush, save the free
    /// lists and mark the header clean.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(writer) = self.writer.take() {
            let drained = writer.close();
            drop(writer);
            let detached = self.engine.detach_writer();
            drained?;
            detached?;
        }

        info!(dir = ?self.engine.dir(), access = ?self.config.access, "database closed");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn count(&self) -> u64 {
        self.engine.count()
    }

    pub fn generation(&self) -> u64 {
        self.engine.generation()
    }

    pub fn stats(&self) -> Stats {
        let mut stats = self.engine.stats();
        stats.queue_depth = self.writer.as_ref().map_or(0, Writer::queue_depth);
        stats
    }

    pub fn access(&self) -> AccessMode {
        self.config.access
    }

    /// `None` for reader handles
    pub fn write_mode(&self) -> Option<WriteMode> {
        self.writer.as_ref().map(Writer::mode)
    }

    /// Canonical directory of the file set
    pub fn data_dir(&self) -> &Path {
        self.engine.dir()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn writer(&self) -> Result<&Writer> {
        if self.closed {
            return Err(RadixError::Closed);
        }
        self.writer
            .as_ref()
            .ok_or_else(|| RadixError::NotAllowed("handle was opened read-only".into()))
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() > self.config.max_key_len {
            return Err(RadixError::InvalidArgument(format!(
                "key of {} bytes exceeds limit of {}",
                key.len(),
                self.config.max_key_len
            )));
        }
        Ok(())
    }

    fn check_entry(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        if value.len() > self.config.max_value_len {
            return Err(RadixError::InvalidArgument(format!(
                "value of {} bytes exceeds limit of {}",
                value.len(),
                self.config.max_value_len
            )));
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "database dropped with an error");
        }
    }
}
