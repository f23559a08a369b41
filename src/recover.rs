//! Startup recovery: load the latest checkpoint, then replay the log tail.
//!
//! Recovery runs once, single-threaded, before the server accepts mutating
//! requests; it requires exclusive access to the chunk map for its whole
//! duration. Degradation order when artifacts are unusable:
//!
//! 1. no `ckpt_latest` alias, or an alias with a bad version header or
//!    pointer line → no checkpoint, full replay from the default generation
//! 2. log segment absent → nothing to replay, checkpoint state stands
//! 3. log segment with a bad version header → replay aborted, checkpoint
//!    state stands
//! 4. individual unparseable log lines → reported and skipped, replay
//!    continues (unknown future opcodes do not block recovery)

use crate::chunkmap::{ChunkMap, ChunkMetadata};
use crate::error::{DurabilityError, DurabilityResult};
use crate::format::{
    log_segment_name, parse_log_pointer, read_line_bounded, version_matches, DEFAULT_GENERATION,
    LATEST_CHECKPOINT, VERSION_LINE,
};
use crate::record::MutationOp;
use crate::storage::Directory;
use std::io::BufReader;
use std::sync::Arc;
use tracing::{debug, warn};

/// What recovery did, and where the engine must continue logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    /// Generation of the segment that was replayed (or would have been, had
    /// it existed); pass to the engine as its start generation.
    pub replay_generation: u64,
    /// Chunks loaded from the checkpoint.
    pub chunks_loaded: usize,
    /// Log lines successfully reapplied.
    pub ops_replayed: usize,
    /// Log lines reported and skipped (unknown opcode or malformed args).
    pub ops_skipped: usize,
}

/// Rebuilds the chunk map from checkpoint + log tail.
pub struct RecoveryManager {
    dir: Arc<dyn Directory>,
}

impl RecoveryManager {
    /// Create a recovery manager for a log directory backend.
    pub fn new(dir: Arc<dyn Directory>) -> Self {
        Self { dir }
    }

    /// Run recovery against `map`.
    ///
    /// Unusable checkpoints degrade to full replay from the default
    /// generation; they are never an error. Errors are reserved for I/O
    /// failures that leave the chunk map untrustworthy.
    pub fn recover(&self, map: &mut dyn ChunkMap) -> DurabilityResult<RecoveryOutcome> {
        let mut replay_generation = DEFAULT_GENERATION;
        let mut chunks_loaded = 0;

        if self.dir.exists(LATEST_CHECKPOINT) {
            match self.load_checkpoint(map) {
                Ok((generation, loaded)) => {
                    replay_generation = generation;
                    chunks_loaded = loaded;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "latest checkpoint unusable; replaying from the default generation"
                    );
                }
            }
        }

        let (ops_replayed, ops_skipped) = self.replay_segment(replay_generation, map)?;
        Ok(RecoveryOutcome {
            replay_generation,
            chunks_loaded,
            ops_replayed,
            ops_skipped,
        })
    }

    /// Load `ckpt_latest`, returning the replay generation from its pointer
    /// line and the number of chunks fed into the map.
    fn load_checkpoint(&self, map: &mut dyn ChunkMap) -> DurabilityResult<(u64, usize)> {
        let mut reader = BufReader::new(self.dir.open_file(LATEST_CHECKPOINT)?);

        let header = read_line_bounded(&mut reader)?
            .ok_or_else(|| DurabilityError::Format("checkpoint is empty".into()))?;
        if !version_matches(&header) {
            return Err(DurabilityError::VersionMismatch {
                expected: VERSION_LINE.to_string(),
                actual: header,
            });
        }

        let pointer = read_line_bounded(&mut reader)?
            .ok_or_else(|| DurabilityError::Format("checkpoint has no pointer line".into()))?;
        let replay_generation = parse_log_pointer(&pointer)
            .ok_or_else(|| DurabilityError::Format(format!("bad pointer line {pointer:?}")))?;
        debug!(replay_generation, "checkpoint names its continuation log");

        let mut chunks_loaded = 0;
        loop {
            let line = match read_line_bounded(&mut reader) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    // Keep what was loaded; the tail is a clean boundary.
                    warn!(error = %e, "stopping checkpoint parse early");
                    break;
                }
            };
            // The first malformed or empty line ends the body.
            let Some(meta) = ChunkMetadata::decode_line(&line) else {
                break;
            };
            map.add_mapping(meta);
            chunks_loaded += 1;
        }

        Ok((replay_generation, chunks_loaded))
    }

    /// Replay the segment for `generation`, dispatching each recognized line.
    fn replay_segment(
        &self,
        generation: u64,
        map: &mut dyn ChunkMap,
    ) -> DurabilityResult<(usize, usize)> {
        let path = log_segment_name(generation);
        if !self.dir.exists(&path) {
            debug!(%path, "log segment absent; nothing to replay");
            return Ok((0, 0));
        }
        let mut reader = BufReader::new(self.dir.open_file(&path)?);

        let Some(header) = read_line_bounded(&mut reader)? else {
            return Ok((0, 0));
        };
        if !version_matches(&header) {
            warn!(%path, header = %header, "log version mismatch; replay aborted");
            return Ok((0, 0));
        }

        let mut ops_replayed = 0;
        let mut ops_skipped = 0;
        loop {
            let line = match read_line_bounded(&mut reader) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(%path, error = %e, "stopping log replay early");
                    break;
                }
            };
            if line.is_empty() {
                break;
            }
            match MutationOp::decode_line(&line) {
                Ok(op) => {
                    apply(map, op);
                    ops_replayed += 1;
                }
                Err(e) => {
                    warn!(line = %line, error = %e, "cannot replay line; skipping");
                    ops_skipped += 1;
                }
            }
        }
        Ok((ops_replayed, ops_skipped))
    }
}

fn apply(map: &mut dyn ChunkMap, op: MutationOp) {
    match op {
        MutationOp::Allocate {
            chunk_id,
            file_id,
            version,
        } => map.replay_alloc_chunk(file_id, chunk_id, version),
        MutationOp::Delete { chunk_id } => map.replay_delete_chunk(chunk_id),
        MutationOp::WriteDone {
            chunk_id,
            size,
            offset,
            checksums,
        } => map.replay_write_done(chunk_id, size, offset, checksums),
        MutationOp::TruncateDone { chunk_id, size } => map.replay_truncate_done(chunk_id, size),
        MutationOp::ChangeVersion {
            chunk_id,
            file_id,
            version,
        } => map.replay_change_chunk_vers(file_id, chunk_id, version),
    }
}
