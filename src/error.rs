//! Error types for `chunklog`.

use std::path::PathBuf;

/// Result type for durability operations.
pub type DurabilityResult<T> = Result<T, DurabilityError>;

/// Errors returned by the `chunklog` crate.
#[derive(thiserror::Error, Debug)]
pub enum DurabilityError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (corrupt, unexpected, unsupported).
    #[error("format error: {0}")]
    Format(String),

    /// Version header line did not match the running version string.
    #[error("version mismatch (expected prefix {expected:?}, got {actual:?})")]
    VersionMismatch {
        /// The version line the running binary writes.
        expected: String,
        /// The line actually read from the file.
        actual: String,
    },

    /// A log or checkpoint line exceeded the line-length bound.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong {
        /// Observed length in bytes.
        len: usize,
        /// Maximum permitted length in bytes.
        max: usize,
    },

    /// Leading opcode token of a log line is not in the dispatch set.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    /// Decoding error (malformed arguments on a recognized line).
    #[error("decode error: {0}")]
    Decode(String),

    /// A checkpoint attempt was abandoned; prior durable state is untouched.
    #[error("checkpoint abandoned: {0}")]
    CheckpointAbandoned(String),

    /// Operation not supported by the storage backend.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Resource not found (file/segment/etc).
    #[error("not found: {0}")]
    NotFound(String),

    /// Requested path does not exist.
    #[error("missing path: {0}")]
    MissingPath(PathBuf),

    /// Lock acquisition failed (concurrent access conflict).
    #[error("lock failed on {resource}: {reason}")]
    LockFailed {
        /// What we were trying to lock (file path, in-memory map, etc.).
        resource: String,
        /// Human-readable reason (poisoned lock, OS error, etc.).
        reason: String,
    },

    /// The log worker thread has exited; the engine no longer accepts work.
    #[error("log worker closed")]
    WorkerClosed,
}
