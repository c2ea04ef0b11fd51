//! Writer Module
//!
//! The single logical writer of a file set.
//!
//! ## Responsibilities
//! - Apply one mutation at a time, in submission order
//! - Sync mode: apply and flush inside the caller's thread
//! - Async mode: queue to a background thread, track applied/durable
//!   watermarks, surface failures on the next wait
//! - Cancellation of queued mutations

mod mutation;
mod queue;

use std::sync::Arc;

pub use mutation::{Ack, Mutation, Outcome, Ticket};
pub use queue::AsyncWriter;

use crate::config::{Config, WriteMode};
use crate::engine::Engine;
use crate::error::Result;

/// Applies mutations inline under the engine's writer mutex
#[derive(Debug)]
pub struct SyncWriter {
    engine: Arc<Engine>,
}

impl SyncWriter {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Apply durably and report what happened
    ///
    /// Readers see the mutation only once it is on disk; a failed commit
    /// leaves the store as it was.
    pub fn submit(&self, mutation: Mutation) -> Result<Outcome> {
        let engine = &self.engine;
        engine.with_writer(|core| engine.apply_durable(core, &mutation))
    }

    pub fn flush(&self) -> Result<()> {
        let engine = &self.engine;
        engine.with_writer(|core| engine.flush_core(core))
    }
}

/// The writer attached to a handle
#[derive(Debug)]
pub enum Writer {
    Sync(SyncWriter),
    Async(AsyncWriter),
}

impl Writer {
    /// Start a writer of the configured mode
    pub fn start(engine: Arc<Engine>, config: &Config) -> Result<Self> {
        Ok(match config.write_mode {
            WriteMode::Sync => Writer::Sync(SyncWriter::new(engine)),
            WriteMode::Async => Writer::Async(AsyncWriter::spawn(engine, config)?),
        })
    }

    pub fn submit(&self, mutation: Mutation) -> Result<Ack> {
        match self {
            Writer::Sync(w) => w.submit(mutation).map(Ack::Applied),
            Writer::Async(w) => w.submit(mutation).map(Ack::Queued),
        }
    }

    /// Everything submitted so far is durable once this returns
    pub fn flush(&self) -> Result<()> {
        match self {
            Writer::Sync(w) => w.flush(),
            Writer::Async(w) => w.flush(),
        }
    }

    /// Sync mode is always caught up
    pub fn wait_for(&self, seq: u64) -> Result<()> {
        match self {
            Writer::Sync(_) => Ok(()),
            Writer::Async(w) => w.wait_for(seq),
        }
    }

    pub fn close(&self) -> Result<()> {
        match self {
            Writer::Sync(w) => w.flush(),
            Writer::Async(w) => w.close(),
        }
    }

    pub fn mode(&self) -> WriteMode {
        match self {
            Writer::Sync(_) => WriteMode::Sync,
            Writer::Async(_) => WriteMode::Async,
        }
    }

    pub fn queue_depth(&self) -> usize {
        match self {
            Writer::Sync(_) => 0,
            Writer::Async(w) => w.queue_depth(),
        }
    }
}
