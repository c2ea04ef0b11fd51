//! Error types for radixkv
//!
//! Provides a unified error type for all operations, plus the numeric
//! status codes used by the integer-returning [`crate::api`] surface.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using RadixError
pub type Result<T> = std::result::Result<T, RadixError>;

/// Unified error type for radixkv operations
///
/// "Key not found" is deliberately absent: lookups return `Option` and
/// removals report [`crate::writer::Outcome::NotFound`].
#[derive(Debug, Error)]
pub enum RadixError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("{file} file is full: {requested} bytes requested, limit is {limit}")]
    OutOfSpace {
        file: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Unsupported format version {found} (this build reads up to {supported})")]
    VersionMismatch { found: u16, supported: u16 },

    #[error("No database found at {0:?}")]
    NoDatabase(PathBuf),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Key already exists")]
    AlreadyExists,

    #[error("Operation not allowed: {0}")]
    NotAllowed(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Writer queue is full")]
    QueueFull,

    #[error("Database handle is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for RadixError {
    fn from(err: bincode::Error) -> Self {
        RadixError::Serialization(err.to_string())
    }
}

impl RadixError {
    /// Numeric status code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            RadixError::Io(_) => ErrorCode::IoFailure,
            RadixError::OutOfSpace { .. } => ErrorCode::OutOfSpace,
            RadixError::Corruption(_) => ErrorCode::Corruption,
            RadixError::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            RadixError::NoDatabase(_) => ErrorCode::NoDatabase,
            RadixError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            RadixError::AlreadyExists => ErrorCode::AlreadyExists,
            RadixError::NotAllowed(_) => ErrorCode::NotAllowed,
            RadixError::Busy(_) => ErrorCode::Busy,
            RadixError::QueueFull => ErrorCode::QueueFull,
            RadixError::Closed => ErrorCode::Closed,
            RadixError::Serialization(_) => ErrorCode::Corruption,
            RadixError::Config(_) => ErrorCode::Config,
        }
    }
}

/// Status codes returned by the integer API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    NotFound = 1,
    InvalidArgument = 2,
    OutOfSpace = 3,
    Corruption = 4,
    IoFailure = 5,
    Busy = 6,
    QueueFull = 7,
    AlreadyExists = 8,
    VersionMismatch = 9,
    Closed = 10,
    NoDatabase = 11,
    NotAllowed = 12,
    Config = 13,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a raw status back to its code, if it is one we issue
    pub fn from_i32(code: i32) -> Option<Self> {
        let code = match code {
            0 => ErrorCode::Success,
            1 => ErrorCode::NotFound,
            2 => ErrorCode::InvalidArgument,
            3 => ErrorCode::OutOfSpace,
            4 => ErrorCode::Corruption,
            5 => ErrorCode::IoFailure,
            6 => ErrorCode::Busy,
            7 => ErrorCode::QueueFull,
            8 => ErrorCode::AlreadyExists,
            9 => ErrorCode::VersionMismatch,
            10 => ErrorCode::Closed,
            11 => ErrorCode::NoDatabase,
            12 => ErrorCode::NotAllowed,
            13 => ErrorCode::Config,
            _ => return None,
        };
        Some(code)
    }
}

impl From<&RadixError> for ErrorCode {
    fn from(err: &RadixError) -> Self {
        err.code()
    }
}
