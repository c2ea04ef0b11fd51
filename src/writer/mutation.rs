//! Mutations, outcomes and tickets

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;

/// A change submitted to the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Store `value` under `key`; with `overwrite == false` an existing key
    /// fails with `AlreadyExists`
    Insert {
        key: Bytes,
        value: Bytes,
        overwrite: bool,
    },
    Remove {
        key: Bytes,
    },
    /// Drop every key
    RemoveAll,
}

impl Mutation {
    pub fn insert(key: &[u8], value: &[u8], overwrite: bool) -> Self {
        Mutation::Insert {
            key: Bytes::copy_from_slice(key),
            value: Bytes::copy_from_slice(value),
            overwrite,
        }
    }

    pub fn remove(key: &[u8]) -> Self {
        Mutation::Remove {
            key: Bytes::copy_from_slice(key),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "insert",
            Mutation::Remove { .. } => "remove",
            Mutation::RemoveAll => "remove_all",
        }
    }
}

/// What an applied mutation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    Removed,
    NotFound,
    Cleared,
}

/// Result of a successful submit
#[derive(Debug, Clone)]
pub enum Ack {
    /// Sync mode: applied and durable
    Applied(Outcome),
    /// Async mode: accepted; track it with the ticket
    Queued(Ticket),
}

impl Ack {
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Ack::Applied(outcome) => Some(*outcome),
            Ack::Queued(_) => None,
        }
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Ack::Applied(_) => None,
            Ack::Queued(ticket) => Some(ticket),
        }
    }
}

pub(crate) const QUEUED: u8 = 0;
pub(crate) const CANCELLED: u8 = 1;
pub(crate) const TAKEN: u8 = 2;

/// Handle on a queued mutation
#[derive(Debug, Clone)]
pub struct Ticket {
    seq: u64,
    state: Arc<AtomicU8>,
}

impl Ticket {
    pub(crate) fn new(seq: u64, state: Arc<AtomicU8>) -> Self {
        Self { seq, state }
    }

    /// Submission sequence number; pass to `wait_for`
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Withdraw the mutation if the writer has not picked it up yet
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    /// The writer has dequeued it (it can no longer be cancelled)
    pub fn is_taken(&self) -> bool {
        self.state.load(Ordering::Acquire) == TAKEN
    }
}

/// Writer side of a ticket: claim the job unless it was cancelled
pub(crate) fn claim(state: &AtomicU8) -> bool {
    state
        .compare_exchange(QUEUED, TAKEN, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}
