//! Operation records and the log-line codec.
//!
//! ## Public invariants (must not change without a version bump)
//!
//! - Every mutation serializes as one text line `<OPCODE> <args...>`.
//! - The opcode set is closed: `ALLOCATE`, `DELETE`, `WRITE`, `TRUNCATE`,
//!   `CHANGE_CHUNK_VERS`. Decoding dispatches over a tagged enum, so adding
//!   an opcode is a compile-time-checked change here, not a runtime table
//!   registration.
//! - `WRITE` carries its checksum count immediately before the checksums.
//!
//! Checkpoint requests travel the same inbound queue as mutations but are
//! never themselves logged; see [`CheckpointRecord`].

use crate::chunkmap::{ChunkId, ChunkVersion, FileId};
use crate::error::{DurabilityError, DurabilityResult};
use std::fmt::Write as _;
use std::str::{FromStr, SplitWhitespace};
use std::sync::Arc;

/// A chunk-state mutation, one per log opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOp {
    /// A new chunk was allocated.
    Allocate {
        /// Chunk identifier.
        chunk_id: ChunkId,
        /// Owning file.
        file_id: FileId,
        /// Initial chunk version.
        version: ChunkVersion,
    },
    /// A chunk was deleted.
    Delete {
        /// Chunk identifier.
        chunk_id: ChunkId,
    },
    /// A write completed, updating size and block checksums.
    WriteDone {
        /// Chunk identifier.
        chunk_id: ChunkId,
        /// Resulting chunk size in bytes.
        size: u64,
        /// Byte offset the write started at.
        offset: u64,
        /// Checksums of the blocks the write covered.
        checksums: Vec<u32>,
    },
    /// A truncation completed, changing the chunk size.
    TruncateDone {
        /// Chunk identifier.
        chunk_id: ChunkId,
        /// Resulting chunk size in bytes.
        size: u64,
    },
    /// The chunk version was bumped.
    ChangeVersion {
        /// Chunk identifier.
        chunk_id: ChunkId,
        /// Owning file.
        file_id: FileId,
        /// New chunk version.
        version: ChunkVersion,
    },
}

fn next_field<T>(tokens: &mut SplitWhitespace<'_>, opcode: &str, field: &str) -> DurabilityResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = tokens
        .next()
        .ok_or_else(|| DurabilityError::Decode(format!("{opcode}: missing {field}")))?;
    raw.parse::<T>()
        .map_err(|e| DurabilityError::Decode(format!("{opcode}: bad {field} {raw:?}: {e}")))
}

impl MutationOp {
    /// Leading token identifying this mutation on disk.
    pub fn opcode(&self) -> &'static str {
        match self {
            MutationOp::Allocate { .. } => "ALLOCATE",
            MutationOp::Delete { .. } => "DELETE",
            MutationOp::WriteDone { .. } => "WRITE",
            MutationOp::TruncateDone { .. } => "TRUNCATE",
            MutationOp::ChangeVersion { .. } => "CHANGE_CHUNK_VERS",
        }
    }

    /// Encode this mutation as one log line (no trailing newline).
    pub fn encode_line(&self) -> String {
        match self {
            MutationOp::Allocate {
                chunk_id,
                file_id,
                version,
            } => format!("ALLOCATE {chunk_id} {file_id} {version}"),
            MutationOp::Delete { chunk_id } => format!("DELETE {chunk_id}"),
            MutationOp::WriteDone {
                chunk_id,
                size,
                offset,
                checksums,
            } => {
                let mut line = format!("WRITE {chunk_id} {size} {offset} {}", checksums.len());
                for checksum in checksums {
                    let _ = write!(line, " {checksum}");
                }
                line
            }
            MutationOp::TruncateDone { chunk_id, size } => format!("TRUNCATE {chunk_id} {size}"),
            MutationOp::ChangeVersion {
                chunk_id,
                file_id,
                version,
            } => format!("CHANGE_CHUNK_VERS {chunk_id} {file_id} {version}"),
        }
    }

    /// Decode one log line.
    ///
    /// Returns [`DurabilityError::UnknownOpcode`] for opcodes outside the
    /// dispatch set and [`DurabilityError::Decode`] for a recognized opcode
    /// with malformed arguments; replay treats both as skip-and-continue.
    pub fn decode_line(line: &str) -> DurabilityResult<MutationOp> {
        let mut tokens = line.split_whitespace();
        let opcode = tokens
            .next()
            .ok_or_else(|| DurabilityError::Decode("empty log line".into()))?;
        match opcode {
            "ALLOCATE" => Ok(MutationOp::Allocate {
                chunk_id: next_field(&mut tokens, opcode, "chunk id")?,
                file_id: next_field(&mut tokens, opcode, "file id")?,
                version: next_field(&mut tokens, opcode, "version")?,
            }),
            "DELETE" => Ok(MutationOp::Delete {
                chunk_id: next_field(&mut tokens, opcode, "chunk id")?,
            }),
            "WRITE" => {
                let chunk_id = next_field(&mut tokens, opcode, "chunk id")?;
                let size = next_field(&mut tokens, opcode, "size")?;
                let offset = next_field(&mut tokens, opcode, "offset")?;
                let count: usize = next_field(&mut tokens, opcode, "checksum count")?;
                let mut checksums = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    checksums.push(next_field(&mut tokens, opcode, "checksum")?);
                }
                Ok(MutationOp::WriteDone {
                    chunk_id,
                    size,
                    offset,
                    checksums,
                })
            }
            "TRUNCATE" => Ok(MutationOp::TruncateDone {
                chunk_id: next_field(&mut tokens, opcode, "chunk id")?,
                size: next_field(&mut tokens, opcode, "size")?,
            }),
            "CHANGE_CHUNK_VERS" => Ok(MutationOp::ChangeVersion {
                chunk_id: next_field(&mut tokens, opcode, "chunk id")?,
                file_id: next_field(&mut tokens, opcode, "file id")?,
                version: next_field(&mut tokens, opcode, "version")?,
            }),
            other => Err(DurabilityError::UnknownOpcode(other.to_string())),
        }
    }
}

/// Completion callback for the producer that submitted a record.
///
/// Invoked from [`crate::engine::LogEngine::dispatch`], i.e. on the host
/// event loop's thread, never on the log worker.
pub trait Requester: Send + Sync {
    /// The record's bytes have survived a flush of the log segment.
    fn op_logged(&self, op: &MutationOp);
}

/// A mutation submitted for durability, with its completion target.
pub struct OpRecord {
    /// The mutation to log.
    pub op: MutationOp,
    /// Whom to notify once the mutation is durably logged.
    pub requester: Option<Arc<dyn Requester>>,
}

impl OpRecord {
    /// Record with no completion notification.
    pub fn new(op: MutationOp) -> Self {
        Self {
            op,
            requester: None,
        }
    }

    /// Record that notifies `requester` at dispatch time.
    pub fn with_requester(op: MutationOp, requester: Arc<dyn Requester>) -> Self {
        Self {
            op,
            requester: Some(requester),
        }
    }
}

impl std::fmt::Debug for OpRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRecord")
            .field("op", &self.op)
            .field("has_requester", &self.requester.is_some())
            .finish()
    }
}

/// What a successful checkpoint attempt produced.
#[derive(Debug, Clone)]
pub struct CheckpointReceipt {
    /// Path of the checkpoint file that was published.
    pub checkpoint_path: String,
    /// Generation of the checkpoint file.
    pub generation: u64,
    /// Generation of the log segment that continues from the checkpoint.
    pub log_generation: u64,
}

/// Channel end used to answer a checkpoint request.
pub type CheckpointResponder = std::sync::mpsc::SyncSender<DurabilityResult<CheckpointReceipt>>;

/// A checkpoint request: a pre-serialized chunk-map snapshot plus an optional
/// responder for the attempt's outcome.
///
/// The snapshot body is captured by the producer while it holds the chunk
/// map, so the worker never touches live map state.
pub struct CheckpointRecord {
    /// Serialized chunk-map body (one metadata line per live chunk).
    pub snapshot: String,
    /// Where to report success or abandonment; `None` for fire-and-forget.
    pub responder: Option<CheckpointResponder>,
}

impl std::fmt::Debug for CheckpointRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointRecord")
            .field("snapshot_bytes", &self.snapshot.len())
            .field("has_responder", &self.responder.is_some())
            .finish()
    }
}

/// What flows down the inbound queue to the log worker.
#[derive(Debug)]
pub enum LogRequest {
    /// Log this mutation, then hand the record back for dispatch.
    Op(OpRecord),
    /// Snapshot + rotate; consumed by the worker, never dispatched.
    Checkpoint(CheckpointRecord),
    /// Flush the current batch and stop the worker. Queued by
    /// [`crate::engine::LogEngine::shutdown`]; requests already in the queue
    /// ahead of it are still processed.
    Shutdown,
}
