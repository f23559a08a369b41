//! `chunklog`: crash-consistent metadata logging for a chunk server.
//!
//! Scope:
//! - storage abstraction over the log directory (`storage::Directory`)
//! - line-oriented operation log with generation-numbered segments (`segment`)
//! - checkpoint files + latest-checkpoint alias (`checkpoint`)
//! - producer/worker logging pipeline with batched flush (`engine`)
//! - startup recovery from checkpoint + log tail (`recover`)
//!
//! Non-goals: chunk data block I/O, network protocol parsing, and
//! cross-server replication. This crate is the local durability layer for one
//! server's chunk metadata.
//!
//! ## Contract (what you can rely on)
//!
//! - **No completion before flush**: a submitted mutation is handed back by
//!   [`engine::LogEngine::dispatch`] only after the flush covering its bytes
//!   succeeded. Flush cost is amortized: the worker drains everything ready
//!   and issues one flush per batch.
//! - **Checkpoint/log linkage**: the checkpoint for generation `G` names log
//!   generation `G + 1`, and publishing it rotates the log to exactly that
//!   generation. Old segments and checkpoints are retained.
//! - **Graceful degradation on recovery**: unusable artifacts (missing alias,
//!   version mismatch, malformed lines) shift recovery to an earlier source
//!   of truth or skip forward; they never abort the process.
//! - **Fatal means fatal**: once an append or flush fails, the worker stops
//!   and the engine refuses further work rather than serving mutations it
//!   cannot durably record.
//!
//! Terminology: `flush()` is a visibility boundary; stable-storage durability
//! (`sync_all`) is opt-in via [`engine::LogEngineOptions::sync_on_flush`].

#![warn(missing_docs)]

pub mod checkpoint;
pub mod chunkmap;
pub mod engine;
pub mod error;
pub mod format;
pub mod record;
pub mod recover;
pub mod segment;
pub mod storage;

pub use chunkmap::{ChunkMap, ChunkMetadata, InMemoryChunkMap};
pub use engine::{LogEngine, LogEngineOptions, SubmitHandle};
pub use error::{DurabilityError, DurabilityResult};
pub use record::{CheckpointReceipt, MutationOp, OpRecord, Requester};
pub use recover::{RecoveryManager, RecoveryOutcome};
pub use storage::{Directory, FsDirectory, MemoryDirectory};
