//! Async writer
//!
//! A FIFO of mutations drained by one background thread. Submitters get a
//! ticket back immediately; the thread applies jobs in submission order and
//! flushes when the queue runs dry or every `async_flush_every` jobs.
//!
//! ```text
//!  submit ──► [seq 7][seq 8][seq 9] ──► radixkv-writer ──► apply ──► flush
//!                                             │                        │
//!                                        applied = 9             durable = 9
//! ```

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{RadixError, Result};

use super::mutation::{self, Mutation, Ticket, CANCELLED, QUEUED};

struct Job {
    seq: u64,
    mutation: Mutation,
    state: Arc<AtomicU8>,
}

#[derive(Debug, Default)]
struct Watermarks {
    /// Highest sequence taken off the queue (applied, failed or skipped)
    applied: u64,
    /// Highest sequence covered by a successful flush
    durable: u64,
    /// First failure not yet reported to a waiter
    error: Option<RadixError>,
    /// The last flush failed; cleared by the next successful one
    flush_failed: bool,
    stopped: bool,
}

/// Progress shared between submitters and the writer thread
#[derive(Debug)]
struct Progress {
    marks: Mutex<Watermarks>,
    changed: Condvar,
    depth: AtomicUsize,
    warned: AtomicBool,
    warn_depth: usize,
}

impl Progress {
    fn new(warn_depth: usize) -> Self {
        Self {
            marks: Mutex::new(Watermarks::default()),
            changed: Condvar::new(),
            depth: AtomicUsize::new(0),
            warned: AtomicBool::new(false),
            warn_depth,
        }
    }

    fn mark_applied(&self, seq: u64) {
        let mut marks = self.marks.lock();
        marks.applied = marks.applied.max(seq);
        drop(marks);
        self.changed.notify_all();
    }

    fn mark_durable(&self, seq: u64) {
        let mut marks = self.marks.lock();
        marks.durable = marks.durable.max(seq);
        marks.flush_failed = false;
        drop(marks);
        self.changed.notify_all();
    }

    fn record_error(&self, err: RadixError, flush: bool) {
        let mut marks = self.marks.lock();
        if marks.error.is_none() {
            marks.error = Some(err);
        }
        marks.flush_failed |= flush;
        drop(marks);
        self.changed.notify_all();
    }

    fn stop(&self) {
        self.marks.lock().stopped = true;
        self.changed.notify_all();
    }

    fn wait_for(&self, seq: u64) -> Result<()> {
        let mut marks = self.marks.lock();
        loop {
            if let Some(err) = marks.error.take() {
                return Err(err);
            }
            if marks.durable >= seq {
                return Ok(());
            }
            if marks.flush_failed {
                return Err(RadixError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "background flush failed",
                )));
            }
            if marks.stopped {
                return Err(RadixError::Closed);
            }
            self.changed.wait(&mut marks);
        }
    }

    fn check_depth(&self) {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth >= self.warn_depth {
            if !self.warned.swap(true, Ordering::Relaxed) {
                warn!(depth, threshold = self.warn_depth, "async writer queue is backing up");
            }
        } else if depth < self.warn_depth / 2 {
            self.warned.store(false, Ordering::Relaxed);
        }
    }
}

/// Queue plus background thread applying mutations in order
#[derive(Debug)]
pub struct AsyncWriter {
    sender: Mutex<Option<Sender<Job>>>,
    /// Last sequence handed out
    last_seq: AtomicU64,
    progress: Arc<Progress>,
    discard: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    bounded: bool,
    submit_timeout: Duration,
    drain_on_close: bool,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("seq", &self.seq)
            .field("mutation", &self.mutation.name())
            .finish()
    }
}

impl AsyncWriter {
    /// Start the writer thread for `engine`
    pub fn spawn(engine: Arc<Engine>, config: &Config) -> Result<Self> {
        let (sender, receiver) = match config.queue_capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };

        let progress = Arc::new(Progress::new(config.queue_warn_depth));
        let discard = Arc::new(AtomicBool::new(false));
        let flush_every = config.async_flush_every;

        let handle = {
            let progress = Arc::clone(&progress);
            let discard = Arc::clone(&discard);
            thread::Builder::new()
                .name("radixkv-writer".into())
                .spawn(move || run(engine, receiver, progress, discard, flush_every))?
        };

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            last_seq: AtomicU64::new(0),
            progress,
            discard,
            handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            bounded: config.queue_capacity.is_some(),
            submit_timeout: config.submit_timeout,
            drain_on_close: config.drain_on_close,
        })
    }

    /// Enqueue a mutation
    ///
    /// A bounded queue that stays full for `submit_timeout` yields
    /// `QueueFull`; the mutation is not queued.
    pub fn submit(&self, mutation: Mutation) -> Result<Ticket> {
        let sender = self.sender.lock();
        let tx = sender.as_ref().ok_or(RadixError::Closed)?;

        // Sequence numbers are only consumed by jobs that made it in.
        let seq = self.last_seq.load(Ordering::Acquire) + 1;
        let state = Arc::new(AtomicU8::new(QUEUED));
        let job = Job {
            seq,
            mutation,
            state: Arc::clone(&state),
        };

        self.progress.depth.fetch_add(1, Ordering::Relaxed);
        let sent = if self.bounded {
            tx.send_timeout(job, self.submit_timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => RadixError::QueueFull,
                SendTimeoutError::Disconnected(_) => RadixError::Closed,
            })
        } else {
            tx.send(job).map_err(|_| RadixError::Closed)
        };
        if let Err(e) = sent {
            self.progress.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(e);
        }

        self.last_seq.store(seq, Ordering::Release);
        self.progress.check_depth();
        Ok(Ticket::new(seq, state))
    }

    /// Block until `seq` is durable, or report the first pending failure
    ///
    /// Sequences that were never handed out are `InvalidArgument`.
    pub fn wait_for(&self, seq: u64) -> Result<()> {
        let last = self.last_seq();
        if seq > last {
            return Err(RadixError::InvalidArgument(format!(
                "sequence {} was never issued (last is {})",
                seq, last
            )));
        }
        self.progress.wait_for(seq)
    }

    /// Wait for everything submitted so far
    pub fn flush(&self) -> Result<()> {
        self.wait_for(self.last_seq())
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Acquire)
    }

    pub fn applied_seq(&self) -> u64 {
        self.progress.marks.lock().applied
    }

    pub fn durable_seq(&self) -> u64 {
        self.progress.marks.lock().durable
    }

    pub fn queue_depth(&self) -> usize {
        self.progress.depth.load(Ordering::Relaxed)
    }

    /// Stop accepting work, drain (or discard) the queue and join the thread
    ///
    /// Only the first call reports failures; later calls return `Ok`.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if !self.drain_on_close {
            self.discard.store(true, Ordering::Release);
        }
        drop(self.sender.lock().take());

        if let Some(handle) = self.handle.lock().take() {
            handle.join().map_err(|_| {
                RadixError::Io(io::Error::new(io::ErrorKind::Other, "writer thread panicked"))
            })?;
        }

        let mut marks = self.progress.marks.lock();
        if let Some(err) = marks.error.take() {
            return Err(err);
        }
        if marks.flush_failed {
            return Err(RadixError::Io(io::Error::new(
                io::ErrorKind::Other,
                "final flush failed",
            )));
        }
        Ok(())
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "async writer closed with an error");
        }
    }
}

fn run(
    engine: Arc<Engine>,
    receiver: Receiver<Job>,
    progress: Arc<Progress>,
    discard: Arc<AtomicBool>,
    flush_every: usize,
) {
    debug!("async writer started");
    let mut since_flush = 0;

    while let Ok(job) = receiver.recv() {
        let mut last = process(&engine, &progress, &discard, job);
        since_flush += 1;

        loop {
            if since_flush >= flush_every {
                flush(&engine, &progress, last);
                since_flush = 0;
            }
            match receiver.try_recv() {
                Ok(job) => {
                    last = process(&engine, &progress, &discard, job);
                    since_flush += 1;
                }
                Err(_) => break,
            }
        }

        // Queue ran dry
        if since_flush > 0 {
            flush(&engine, &progress, last);
            since_flush = 0;
        }
    }

    progress.stop();
    debug!("async writer stopped");
}

fn process(engine: &Engine, progress: &Progress, discard: &AtomicBool, job: Job) -> u64 {
    progress.depth.fetch_sub(1, Ordering::Relaxed);

    if discard.load(Ordering::Acquire) {
        job.state.store(CANCELLED, Ordering::Release);
    } else if !mutation::claim(&job.state) {
        debug!(seq = job.seq, "skipping cancelled mutation");
    } else if let Err(e) = engine.with_writer(|core| engine.apply(core, &job.mutation)) {
        error!(seq = job.seq, op = job.mutation.name(), error = %e, "async mutation failed");
        progress.record_error(e, false);
    }

    progress.mark_applied(job.seq);
    job.seq
}

fn flush(engine: &Engine, progress: &Progress, through: u64) {
    match engine.with_writer(|core| engine.flush_core(core)) {
        Ok(()) => progress.mark_durable(through),
        Err(e) => {
            error!(through, error = %e, "async flush failed");
            progress.record_error(e, true);
        }
    }
}
