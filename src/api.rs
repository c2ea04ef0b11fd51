//! Status-code API
//!
//! Five entry points returning integer codes, shaped for a thin binding
//! layer: `open` / `add` / `find` / `remove` / `close`, plus a reusable
//! [`QueryResult`] buffer that `find` fills.
//!
//! Codes are the values of [`ErrorCode`]; `0` is success. In async mode
//! `add` and `remove` return `0` as soon as the mutation is queued.

use crate::config::{Config, WriteMode};
use crate::db::Database;
use crate::error::{ErrorCode, RadixError};
use crate::writer::{Ack, Outcome};

/// Sync writer mode for [`open`]
pub const SYNC_WRITER: i32 = 0;

/// Async writer mode for [`open`]
pub const ASYNC_WRITER: i32 = 1;

/// Opaque handle returned by [`open`]
#[derive(Debug)]
pub struct Handle {
    db: Database,
}

impl Handle {
    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Reusable holder for the bytes of the most recent lookup
#[derive(Debug, Default, Clone)]
pub struct QueryResult {
    data: Vec<u8>,
    data_len: usize,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_len]
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.data_len = 0;
    }
}

/// Open a writer handle on `path` (mode 0 = sync, 1 = async)
pub fn open(path: &str, mode: i32) -> Result<Handle, i32> {
    let write_mode = match mode {
        SYNC_WRITER => WriteMode::Sync,
        ASYNC_WRITER => WriteMode::Async,
        _ => return Err(ErrorCode::InvalidArgument.as_i32()),
    };

    let config = Config::builder()
        .data_dir(path)
        .write_mode(write_mode)
        .build();
    Database::open(config)
        .map(|db| Handle { db })
        .map_err(|e| status(&e))
}

/// Insert or overwrite; `key_len` / `value_len` bytes of each buffer are used
pub fn add(handle: &Handle, key: &[u8], key_len: usize, value: &[u8], value_len: usize) -> i32 {
    let (Some(key), Some(value)) = (key.get(..key_len), value.get(..value_len)) else {
        return ErrorCode::InvalidArgument.as_i32();
    };
    match handle.db.add(key, value) {
        Ok(_) => ErrorCode::Success.as_i32(),
        Err(e) => status(&e),
    }
}

/// Look `key` up, filling `result` on success
pub fn find(handle: &Handle, key: &[u8], key_len: usize, result: &mut QueryResult) -> i32 {
    let Some(key) = key.get(..key_len) else {
        return ErrorCode::InvalidArgument.as_i32();
    };
    match handle.db.find_into(key, &mut result.data) {
        Ok(true) => {
            result.data_len = result.data.len();
            ErrorCode::Success.as_i32()
        }
        Ok(false) => {
            result.clear();
            ErrorCode::NotFound.as_i32()
        }
        Err(e) => {
            result.clear();
            status(&e)
        }
    }
}

/// Remove `key`; a missing key is `NotFound` in sync mode
pub fn remove(handle: &Handle, key: &[u8], key_len: usize) -> i32 {
    let Some(key) = key.get(..key_len) else {
        return ErrorCode::InvalidArgument.as_i32();
    };
    match handle.db.remove(key) {
        Ok(Ack::Applied(Outcome::NotFound)) => ErrorCode::NotFound.as_i32(),
        Ok(_) => ErrorCode::Success.as_i32(),
        Err(e) => status(&e),
    }
}

/// Close the handle, draining and flushing any queued mutations
pub fn close(handle: Handle) -> i32 {
    match handle.db.close() {
        Ok(()) => ErrorCode::Success.as_i32(),
        Err(e) => status(&e),
    }
}

fn status(err: &RadixError) -> i32 {
    err.code().as_i32()
}
