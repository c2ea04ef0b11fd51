//! Engine Module
//!
//! The per-file-set core shared by every handle open on the same directory.
//!
//! ## Responsibilities
//! - Create or validate the file set and its header
//! - Publish the current root / generation to readers
//! - Apply mutations through copy-on-write trie changes
//! - Flush (data, index, then header) and reclaim retired space
//! - Persist or rebuild free lists across shutdowns

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::alloc::{Allocator, FreeList, PersistedFreeLists, ReaderPins, Region, RetiredBatch, RetiredQueue};
use crate::backup::{self, BackupReport};
use crate::config::{AccessMode, Config, WriteMode};
use crate::data::{self, ValueDescriptor, DATA_START};
use crate::error::{RadixError, Result};
use crate::header::{Header, FLAG_ASYNC, FLAG_CLEAN, HEADER_AREA};
use crate::storage::{LockFile, LockLevel, RegionFile};
use crate::trie::{self, NodeRef, TrieTxn, NULL_NODE};
use crate::writer::{Mutation, Outcome};

/// Writer-owned state, guarded by the engine's writer mutex
#[derive(Debug)]
pub struct WriterCore {
    /// Last header written (fields ahead of disk until the next flush)
    header: Header,
    index_alloc: Allocator,
    data_alloc: Allocator,
    retired: RetiredQueue,
    /// Mutations applied since the last flush
    unflushed: usize,
}

/// A mutation written to free space but not yet visible to readers
#[derive(Debug)]
struct Staged {
    root: NodeRef,
    generation: u64,
    key_count: u64,
    retired: RetiredBatch,
    /// Regions this mutation allocated, given back if it is abandoned
    written_index: Vec<Region>,
    written_data: Vec<Region>,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub key_count: u64,
    pub generation: u64,
    pub durable_generation: u64,
    pub index_file_size: u64,
    pub data_file_size: u64,
    pub index_end: u64,
    pub data_end: u64,
    pub index_free_bytes: u64,
    pub data_free_bytes: u64,
    /// Retired bytes waiting for readers or a flush
    pub pending_reclaim_bytes: u64,
    pub active_readers: usize,
    pub writer_attached: bool,
    /// Async queue depth of the handle that asked (0 otherwise)
    pub queue_depth: usize,
}

/// Shared state of one open file set
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes**: serialized by the `writer` mutex
///   - Only ONE mutation is applied at a time
///   - New nodes and values go to unreferenced space, then the new root and
///     generation are published (root first, generation second)
///
/// - **Reads**: take no lock for the traversal
///   - Load generation, load root, pin the generation, re-check it
///   - A moved generation restarts the read
///
/// - **Reclamation**: a retired region is reused only once no reader is
///   pinned below the generation that retired it and the header on disk
///   has reached that generation
#[derive(Debug)]
pub struct Engine {
    dir: PathBuf,

    /// Limits and growth settings of the handle that opened the file set
    config: Config,

    index: RegionFile,
    data: RegionFile,

    lock: Mutex<Option<LockFile>>,

    // Published state
    root: AtomicU64,
    generation: AtomicU64,
    key_count: AtomicU64,
    durable_generation: AtomicU64,

    pins: ReaderPins,

    writer: Mutex<Option<WriterCore>>,
    writer_attached: AtomicBool,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    pub const INDEX_FILENAME: &'static str = "radix.idx";
    pub const DATA_FILENAME: &'static str = "radix.dat";
    pub const FREE_FILENAME: &'static str = "radix.free";
    pub const LOCK_FILENAME: &'static str = "radix.lck";

    /// Open or create the file set in `dir`
    ///
    /// On startup:
    /// 1. Take the advisory lock (exclusive for writers, shared for readers)
    /// 2. Create the files if missing (writers only)
    /// 3. Load the newest valid header slot
    /// 4. Validate the data preamble and high-water marks
    /// 5. Publish root / generation / count
    pub fn open(dir: &Path, config: &Config) -> Result<Self> {
        let index_path = dir.join(Self::INDEX_FILENAME);
        let data_path = dir.join(Self::DATA_FILENAME);

        if config.access == AccessMode::Reader && !index_path.exists() {
            return Err(RadixError::NoDatabase(dir.to_path_buf()));
        }

        // Step 1: Lock before touching the files
        let lock = if config.exclusive {
            let level = match config.access {
                AccessMode::Writer => LockLevel::Exclusive,
                AccessMode::Reader => LockLevel::Shared,
            };
            let mut lock = LockFile::open(&dir.join(Self::LOCK_FILENAME))?;
            if !lock.try_lock(level)? {
                return Err(RadixError::Busy(format!(
                    "{:?} is locked by another process",
                    dir
                )));
            }
            Some(lock)
        } else {
            None
        };

        // Step 2: Create the file set on first use
        if !index_path.exists() {
            Self::create_files(dir, config)?;
        }

        // Step 3: Open files and load the header
        let index = RegionFile::open("index", &index_path, config.index_max_size, config.grow_chunk)?;
        let data = RegionFile::open("data", &data_path, config.data_max_size, config.grow_chunk)?;
        let header = Header::read_latest(&index)?;

        // Step 4: Sanity-check what the header claims
        data::check_preamble(&data)?;
        if header.index_end < HEADER_AREA || header.index_end > index.len() {
            return Err(RadixError::Corruption(format!(
                "index high-water mark {} outside file of {} bytes",
                header.index_end,
                index.len()
            )));
        }
        if header.data_end < DATA_START || header.data_end > data.len() {
            return Err(RadixError::Corruption(format!(
                "data high-water mark {} outside file of {} bytes",
                header.data_end,
                data.len()
            )));
        }

        info!(
            dir = ?dir,
            generation = header.generation,
            keys = header.key_count,
            clean = header.is_clean(),
            async_writer = header.is_async(),
            "opened file set"
        );

        // Step 5: Publish
        Ok(Self {
            dir: dir.to_path_buf(),
            config: config.clone(),
            index,
            data,
            lock: Mutex::new(lock),
            root: AtomicU64::new(header.root),
            generation: AtomicU64::new(header.generation),
            key_count: AtomicU64::new(header.key_count),
            durable_generation: AtomicU64::new(header.generation),
            pins: ReaderPins::new(),
            writer: Mutex::new(None),
            writer_attached: AtomicBool::new(false),
        })
    }

    /// Lay down an empty file set
    ///
    /// The index is built under a temporary name and renamed into place, so
    /// a crash part way leaves no index and the next open starts over.
    fn create_files(dir: &Path, config: &Config) -> Result<()> {
        let index_path = dir.join(Self::INDEX_FILENAME);
        let data_path = dir.join(Self::DATA_FILENAME);
        let tmp_path = dir.join(format!("{}.tmp", Self::INDEX_FILENAME));

        for stale in [&data_path, &tmp_path] {
            if stale.exists() {
                warn!(path = ?stale, "removing leftover from an interrupted create");
                fs::remove_file(stale)?;
            }
        }
        PersistedFreeLists::remove(&dir.join(Self::FREE_FILENAME))?;

        let data = RegionFile::create("data", &data_path, DATA_START, config.data_max_size, config.grow_chunk)?;
        data.write_at(&data::preamble(), 0)?;
        data.sync()?;

        let index = RegionFile::create("index", &tmp_path, HEADER_AREA, config.index_max_size, config.grow_chunk)?;
        Header::new(DATA_START).write(&index)?;
        drop(index);
        fs::rename(&tmp_path, &index_path)?;

        info!(dir = ?dir, "created new file set");
        Ok(())
    }

    // =========================================================================
    // Writer Attachment
    // =========================================================================

    /// Make the calling handle the file set's single writer
    ///
    /// Loads (or rebuilds) the free lists on first attach and marks the
    /// header dirty until `detach_writer`.
    pub fn attach_writer(&self, mode: WriteMode) -> Result<()> {
        if self
            .writer_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RadixError::Busy(
                "a writer is already attached to this file set".into(),
            ));
        }

        let attached = self.attach_writer_inner(mode);
        if attached.is_err() {
            self.writer_attached.store(false, Ordering::Release);
        }
        attached
    }

    fn attach_writer_inner(&self, mode: WriteMode) -> Result<()> {
        if let Some(lock) = self.lock.lock().as_mut() {
            if !lock.try_lock(LockLevel::Exclusive)? {
                return Err(RadixError::Busy(format!(
                    "{:?} has readers in another process",
                    self.dir
                )));
            }
        }

        let mut guard = self.writer.lock();
        let mut core = match guard.take() {
            Some(core) => core,
            None => self.load_writer_core()?,
        };

        PersistedFreeLists::remove(&self.free_path())?;
        core.header.set_flag(FLAG_CLEAN, false);
        core.header.set_flag(FLAG_ASYNC, mode == WriteMode::Async);
        self.commit_header(&mut core)?;

        debug!(mode = ?mode, commit = core.header.commit, "writer attached");
        *guard = Some(core);
        Ok(())
    }

    fn load_writer_core(&self) -> Result<WriterCore> {
        let header = Header::read_latest(&self.index)?;

        let persisted = if header.is_clean() {
            PersistedFreeLists::load(&self.free_path(), header.commit)?
        } else {
            warn!(
                generation = header.generation,
                "file set was not closed cleanly, rebuilding free lists"
            );
            None
        };

        let (index_free, data_free) = match persisted {
            Some(lists) => (lists.index, lists.data),
            None => self.rebuild_free_lists(&header)?,
        };
        let mut header = header;
        header.key_count = self.count();

        Ok(WriterCore {
            header,
            index_alloc: Allocator::new(header.index_end, index_free),
            data_alloc: Allocator::new(header.data_end, data_free),
            retired: RetiredQueue::new(),
            unflushed: 0,
        })
    }

    /// Everything below the high-water marks that the trie does not reach
    fn rebuild_free_lists(&self, header: &Header) -> Result<(FreeList, FreeList)> {
        let mut live_index = Vec::new();
        let mut live_data = Vec::new();

        trie::reader::walk(&self.index, header.root, |at, stored| {
            live_index.push((at, stored.size));
            if let Some(value) = stored.node.value {
                live_data.push((value.offset, value.record_size()));
            }
            Ok(())
        })?;

        let keys = live_data.len() as u64;
        if keys != header.key_count {
            warn!(
                recorded = header.key_count,
                found = keys,
                "key count disagrees with trie, using trie"
            );
            self.key_count.store(keys, Ordering::Release);
        }

        let index_free = FreeList::from_gaps(HEADER_AREA, header.index_end, &mut live_index)?;
        let data_free = FreeList::from_gaps(DATA_START, header.data_end, &mut live_data)?;

        info!(
            nodes = live_index.len(),
            keys,
            index_free = index_free.total_bytes(),
            data_free = data_free.total_bytes(),
            "rebuilt free lists"
        );
        Ok((index_free, data_free))
    }

    /// Release the writer role: flush, save free lists, mark clean
    pub fn detach_writer(&self) -> Result<()> {
        let detached = self.detach_writer_inner();

        if let Some(lock) = self.lock.lock().as_mut() {
            match lock.try_lock(LockLevel::Shared) {
                Ok(true) => {}
                Ok(false) => warn!("could not downgrade file set lock"),
                Err(e) => warn!(error = %e, "could not downgrade file set lock"),
            }
        }
        self.writer_attached.store(false, Ordering::Release);
        detached
    }

    fn detach_writer_inner(&self) -> Result<()> {
        let mut guard = self.writer.lock();
        let core = match guard.as_mut() {
            Some(core) => core,
            None => return Ok(()),
        };

        self.flush_core(core)?;
        self.reclaim(core);
        if !core.retired.is_empty() {
            debug!(
                bytes = core.retired.pending_bytes(),
                "readers still pinned at close, retired space stays pending"
            );
        }

        let lists = PersistedFreeLists {
            commit: core.header.commit + 1,
            index: core.index_alloc.free_list().clone(),
            data: core.data_alloc.free_list().clone(),
        };
        lists.save(&self.free_path())?;

        core.header.set_flag(FLAG_CLEAN, true);
        self.commit_header(core)?;

        debug!(commit = core.header.commit, "writer detached");
        Ok(())
    }

    /// Run `f` with exclusive access to the writer state
    pub fn with_writer<T>(&self, f: impl FnOnce(&mut WriterCore) -> Result<T>) -> Result<T> {
        let mut guard = self.writer.lock();
        match guard.as_mut() {
            Some(core) if self.writer_attached.load(Ordering::Acquire) => f(core),
            _ => Err(RadixError::Closed),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Apply one mutation and publish it to readers (not yet durable)
    pub fn apply(&self, core: &mut WriterCore, mutation: &Mutation) -> Result<Outcome> {
        let (outcome, staged) = self.stage(core, mutation)?;
        if let Some(staged) = staged {
            self.publish(core, staged);
            core.unflushed += 1;
            self.reclaim(core);
        }
        Ok(outcome)
    }

    /// Apply one mutation and make it durable before readers can see it
    ///
    /// A failed commit gives the mutation's regions back and leaves the
    /// published state untouched.
    pub fn apply_durable(&self, core: &mut WriterCore, mutation: &Mutation) -> Result<Outcome> {
        self.flush_core(core)?;

        let (outcome, staged) = self.stage(core, mutation)?;
        let staged = match staged {
            Some(staged) => staged,
            None => return Ok(outcome),
        };

        let committed = core.header;
        core.header.root = staged.root;
        core.header.generation = staged.generation;
        core.header.key_count = staged.key_count;
        if let Err(e) = self.commit_header(core) {
            warn!(generation = staged.generation, error = %e, "commit failed, mutation abandoned");
            core.header = committed;
            self.abandon(core, staged);
            return Err(e);
        }

        let generation = staged.generation;
        self.publish(core, staged);
        self.durable_generation.store(generation, Ordering::Release);
        self.reclaim(core);
        Ok(outcome)
    }

    /// Write a mutation's new records without publishing them
    ///
    /// `None` means the mutation changed nothing.
    fn stage(&self, core: &mut WriterCore, mutation: &Mutation) -> Result<(Outcome, Option<Staged>)> {
        let root = self.root.load(Ordering::Acquire);
        let generation = self.generation.load(Ordering::Acquire) + 1;

        match mutation {
            Mutation::Insert {
                key,
                value,
                overwrite,
            } => self.stage_insert(core, root, generation, key, value, *overwrite),
            Mutation::Remove { key } => self.stage_remove(core, root, generation, key),
            Mutation::RemoveAll => self.stage_remove_all(core, root, generation),
        }
    }

    fn stage_insert(
        &self,
        core: &mut WriterCore,
        root: NodeRef,
        generation: u64,
        key: &[u8],
        value: &[u8],
        overwrite: bool,
    ) -> Result<(Outcome, Option<Staged>)> {
        if !overwrite && trie::reader::lookup(&self.index, root, key)?.is_some() {
            return Err(RadixError::AlreadyExists);
        }

        // Step 1: Value record into free data space
        let size = data::record_size(value.len());
        let offset = core.data_alloc.allocate(size, &self.data)?;
        if let Err(e) = self.data.write_at(&data::encode_record(value, generation), offset) {
            core.data_alloc.release(offset, size);
            return Err(e);
        }
        let desc = ValueDescriptor {
            offset,
            len: value.len() as u32,
            seq: generation,
        };

        // Step 2: Copy the path down to the key
        let mut txn = TrieTxn::new(&self.index, &mut core.index_alloc);
        let (new_root, previous) = match txn.insert(root, key, desc) {
            Ok(inserted) => inserted,
            Err(e) => {
                txn.abort();
                core.data_alloc.release(offset, size);
                return Err(e);
            }
        };
        let (written, retired) = txn.finish();

        let outcome = if previous.is_some() {
            Outcome::Updated
        } else {
            Outcome::Inserted
        };
        Ok((
            outcome,
            Some(Staged {
                root: new_root,
                generation,
                key_count: self.count() + u64::from(previous.is_none()),
                retired: RetiredBatch {
                    generation,
                    index: retired,
                    data: previous
                        .map(|old| vec![(old.offset, old.record_size())])
                        .unwrap_or_default(),
                },
                written_index: written,
                written_data: vec![(offset, size)],
            }),
        ))
    }

    fn stage_remove(
        &self,
        core: &mut WriterCore,
        root: NodeRef,
        generation: u64,
        key: &[u8],
    ) -> Result<(Outcome, Option<Staged>)> {
        let mut txn = TrieTxn::new(&self.index, &mut core.index_alloc);
        match txn.remove(root, key) {
            Ok(None) => Ok((Outcome::NotFound, None)),
            Ok(Some((new_root, removed))) => {
                let (written, retired) = txn.finish();
                Ok((
                    Outcome::Removed,
                    Some(Staged {
                        root: new_root,
                        generation,
                        key_count: self.count().saturating_sub(1),
                        retired: RetiredBatch {
                            generation,
                            index: retired,
                            data: vec![(removed.offset, removed.record_size())],
                        },
                        written_index: written,
                        written_data: Vec::new(),
                    }),
                ))
            }
            Err(e) => {
                txn.abort();
                Err(e)
            }
        }
    }

    fn stage_remove_all(
        &self,
        core: &mut WriterCore,
        root: NodeRef,
        generation: u64,
    ) -> Result<(Outcome, Option<Staged>)> {
        if root == NULL_NODE {
            return Ok((Outcome::Cleared, None));
        }

        let mut txn = TrieTxn::new(&self.index, &mut core.index_alloc);
        let values = match txn.clear(root) {
            Ok(values) => values,
            Err(e) => {
                txn.abort();
                return Err(e);
            }
        };
        let (_, retired) = txn.finish();

        info!(generation, keys = values.len(), "removing all keys");
        Ok((
            Outcome::Cleared,
            Some(Staged {
                root: NULL_NODE,
                generation,
                key_count: 0,
                retired: RetiredBatch {
                    generation,
                    index: retired,
                    data: values.iter().map(|v| (v.offset, v.record_size())).collect(),
                },
                written_index: Vec::new(),
                written_data: Vec::new(),
            }),
        ))
    }

    /// Make a staged mutation visible: root first, generation second
    fn publish(&self, core: &mut WriterCore, staged: Staged) {
        core.retired.push(staged.retired);
        core.header.root = staged.root;
        core.header.generation = staged.generation;
        core.header.key_count = staged.key_count;

        self.key_count.store(staged.key_count, Ordering::Release);
        self.root.store(staged.root, Ordering::Release);
        self.generation.store(staged.generation, Ordering::Release);
    }

    /// Give back everything a staged mutation allocated
    fn abandon(&self, core: &mut WriterCore, staged: Staged) {
        for (offset, size) in staged.written_index {
            core.index_alloc.release(offset, size);
        }
        for (offset, size) in staged.written_data {
            core.data_alloc.release(offset, size);
        }
    }

    // =========================================================================
    // Durability / Reclamation
    // =========================================================================

    /// Make every applied mutation durable
    pub fn flush_core(&self, core: &mut WriterCore) -> Result<()> {
        if core.unflushed == 0 {
            return Ok(());
        }

        self.commit_header(core)?;
        let flushed = core.unflushed;
        core.unflushed = 0;
        self.durable_generation
            .store(core.header.generation, Ordering::Release);
        self.reclaim(core);

        debug!(
            generation = core.header.generation,
            mutations = flushed,
            "flushed"
        );
        Ok(())
    }

    /// Sync both files, then write the header into the other slot
    fn commit_header(&self, core: &mut WriterCore) -> Result<()> {
        self.data.sync()?;
        self.index.sync()?;

        core.header.index_end = core.index_alloc.end();
        core.header.data_end = core.data_alloc.end();
        core.header.commit += 1;
        if let Err(e) = core.header.write(&self.index) {
            // keep targeting the slot that may now be torn
            core.header.commit -= 1;
            return Err(e);
        }
        Ok(())
    }

    /// Give the free space at the end of both files back to the filesystem
    ///
    /// Flushes first so everything retired so far can be reclaimed, commits
    /// the lowered high-water marks, then truncates. Returns the bytes
    /// released.
    pub fn shrink(&self, core: &mut WriterCore) -> Result<u64> {
        self.flush_core(core)?;
        self.reclaim(core);

        let index_end = core.index_alloc.end();
        let data_end = core.data_alloc.end();
        if self.index.len() <= index_end && self.data.len() <= data_end {
            return Ok(0);
        }

        // Both slots must describe files that fit the truncated lengths,
        // or a fallback to the older slot would point past the end.
        self.commit_header(core)?;
        self.commit_header(core)?;

        let before = self.index.len() + self.data.len();
        self.index.truncate(core.header.index_end)?;
        self.data.truncate(core.header.data_end)?;
        let released = before - (self.index.len() + self.data.len());

        info!(
            released,
            index_end = core.header.index_end,
            data_end = core.header.data_end,
            pending = core.retired.pending_bytes(),
            "shrank file set"
        );
        Ok(released)
    }

    /// Hand retired regions back to the allocators once safe
    fn reclaim(&self, core: &mut WriterCore) {
        let oldest = self.pins.oldest();
        let durable = self.durable_generation.load(Ordering::Acquire);

        for batch in core.retired.drain_ready(oldest, durable) {
            trace!(generation = batch.generation, "reclaiming retired regions");
            for (offset, size) in batch.index {
                core.index_alloc.release(offset, size);
            }
            for (offset, size) in batch.data {
                core.data_alloc.release(offset, size);
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Exact lookup; fills `out` and returns whether the key exists
    pub fn lookup_into(&self, key: &[u8], out: &mut Vec<u8>) -> Result<bool> {
        self.read_snapshot(|root, _| match trie::reader::lookup(&self.index, root, key)? {
            Some(desc) => {
                data::read_value_into(&self.data, &desc, out)?;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Longest stored key that prefixes `key`: its length and value
    pub fn longest_prefix(&self, key: &[u8]) -> Result<Option<(usize, Vec<u8>)>> {
        self.read_snapshot(|root, _| match trie::reader::longest_prefix(&self.index, root, key)? {
            Some((len, desc)) => {
                let mut value = Vec::with_capacity(desc.len as usize);
                data::read_value_into(&self.data, &desc, &mut value)?;
                Ok(Some((len, value)))
            }
            None => Ok(None),
        })
    }

    /// Copy the current snapshot into a new file set at `dest`
    ///
    /// The snapshot stays pinned for the whole copy, so the writer keeps
    /// going but cannot reuse anything the copy still has to read.
    pub fn backup(&self, dest: &Path) -> Result<BackupReport> {
        let report = self.read_snapshot(|root, generation| {
            backup::copy_snapshot(&self.index, &self.data, root, generation, dest, &self.config)
        })?;

        info!(
            dest = ?dest,
            generation = report.generation,
            keys = report.keys,
            index_bytes = report.index_bytes,
            data_bytes = report.data_bytes,
            "backup written"
        );
        Ok(report)
    }

    /// Run `read` against a pinned, consistent root and its generation
    ///
    /// Restarts when the generation moves between taking the root and
    /// pinning it, or when a damaged record turns out to belong to a state
    /// the writer has since replaced.
    fn read_snapshot<T>(&self, mut read: impl FnMut(NodeRef, u64) -> Result<T>) -> Result<T> {
        let limit = self.config.read_retry_limit;
        let mut attempts = 0;

        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let root = self.root.load(Ordering::Acquire);
            let pin = self.pins.pin(generation);

            if self.generation.load(Ordering::Acquire) == generation {
                match read(root, generation) {
                    Err(RadixError::Corruption(_))
                        if self.generation.load(Ordering::Acquire) != generation => {}
                    other => return other,
                }
            }
            drop(pin);

            attempts += 1;
            if attempts >= limit {
                return Err(RadixError::Busy(format!(
                    "lookup restarted {} times while the writer moved on",
                    attempts
                )));
            }
            trace!(attempts, generation, "snapshot moved, retrying read");
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn count(&self) -> u64 {
        self.key_count.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn durable_generation(&self) -> u64 {
        self.durable_generation.load(Ordering::Acquire)
    }

    pub fn is_writer_attached(&self) -> bool {
        self.writer_attached.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats {
            key_count: self.count(),
            generation: self.generation(),
            durable_generation: self.durable_generation(),
            index_file_size: self.index.len(),
            data_file_size: self.data.len(),
            index_end: 0,
            data_end: 0,
            index_free_bytes: 0,
            data_free_bytes: 0,
            pending_reclaim_bytes: 0,
            active_readers: self.pins.active(),
            writer_attached: self.is_writer_attached(),
            queue_depth: 0,
        };

        if let Some(core) = self.writer.lock().as_ref() {
            stats.index_end = core.index_alloc.end();
            stats.data_end = core.data_alloc.end();
            stats.index_free_bytes = core.index_alloc.free_list().total_bytes();
            stats.data_free_bytes = core.data_alloc.free_list().total_bytes();
            stats.pending_reclaim_bytes = core.retired.pending_bytes();
        } else if let Ok(header) = Header::read_latest(&self.index) {
            stats.index_end = header.index_end;
            stats.data_end = header.data_end;
        }
        stats
    }

    fn free_path(&self) -> PathBuf {
        self.dir.join(Self::FREE_FILENAME)
    }

    /// Make every sync of both files fail while `on`
    #[cfg(test)]
    pub(crate) fn fail_syncs(&self, on: bool) {
        self.index.fail_syncs(on);
        self.data.fail_syncs(on);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        debug!(dir = ?self.dir, "file set released");
    }
}
