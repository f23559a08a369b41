//! Checkpoint file writing and latest-alias publication.
//!
//! ## Protocol (executed by the log worker, in this order)
//!
//! 1. truncate-create `ckpt.<G>` where `G` is the current log generation
//! 2. write the version header, the `log: logs.<G+1>` pointer line, and the
//!    snapshot body
//! 3. flush, sync, and read the header back (a checkpoint that cannot be
//!    re-read must never be published)
//! 4. delete the old `ckpt_latest` alias, then hard-link the new file under
//!    that name
//!
//! A failure in steps 1-3 abandons the attempt: no alias change, no log
//! rotation, prior durable state untouched. The alias is briefly absent
//! between delete and link in step 4; recovery tolerates that by falling
//! back to full replay from the default generation. Old checkpoint files are
//! retained.

use crate::error::{DurabilityError, DurabilityResult};
use crate::format::{
    checkpoint_name, log_pointer_line, parse_log_pointer, read_line_bounded, version_matches,
    LATEST_CHECKPOINT, VERSION_LINE,
};
use crate::record::CheckpointReceipt;
use crate::storage::{self, Directory};
use std::io::{BufReader, Write};
use std::sync::Arc;
use tracing::warn;

/// Writes checkpoint files and maintains the `ckpt_latest` alias.
pub struct CheckpointWriter {
    dir: Arc<dyn Directory>,
}

impl CheckpointWriter {
    /// Create a checkpoint writer for a log directory backend.
    pub fn new(dir: Arc<dyn Directory>) -> Self {
        Self { dir }
    }

    /// Write, verify, and publish the checkpoint for `generation`.
    ///
    /// `snapshot` is the pre-serialized chunk-map body (newline-terminated
    /// metadata lines). On success the returned receipt names the log
    /// generation the caller must rotate to. On [`DurabilityError::CheckpointAbandoned`]
    /// nothing was published and the caller must not rotate.
    pub fn write_and_publish(
        &self,
        generation: u64,
        snapshot: &str,
    ) -> DurabilityResult<CheckpointReceipt> {
        let checkpoint_path = checkpoint_name(generation);
        let log_generation = generation + 1;

        self.write_snapshot(&checkpoint_path, log_generation, snapshot)
            .map_err(|e| {
                DurabilityError::CheckpointAbandoned(format!(
                    "write {checkpoint_path} failed: {e}"
                ))
            })?;

        self.verify(&checkpoint_path, log_generation).map_err(|e| {
            DurabilityError::CheckpointAbandoned(format!(
                "read-back of {checkpoint_path} failed: {e}"
            ))
        })?;

        // Republish the alias: old name out, new name in. Failures past this
        // point only degrade discoverability, never durability, so they are
        // reported and swallowed.
        if let Err(e) = self.dir.delete(LATEST_CHECKPOINT) {
            warn!(alias = LATEST_CHECKPOINT, error = %e, "failed to remove old checkpoint alias");
        }
        if let Err(e) = self.dir.hard_link(&checkpoint_path, LATEST_CHECKPOINT) {
            warn!(
                checkpoint = %checkpoint_path,
                alias = LATEST_CHECKPOINT,
                error = %e,
                "failed to link latest-checkpoint alias"
            );
        }

        Ok(CheckpointReceipt {
            checkpoint_path,
            generation,
            log_generation,
        })
    }

    fn write_snapshot(
        &self,
        path: &str,
        log_generation: u64,
        snapshot: &str,
    ) -> DurabilityResult<()> {
        let mut file = self.dir.create_file(path)?;
        writeln!(file, "{VERSION_LINE}")?;
        writeln!(file, "{}", log_pointer_line(log_generation))?;
        file.write_all(snapshot.as_bytes())?;
        file.flush()?;
        drop(file);

        match storage::sync_file(&*self.dir, path) {
            Err(DurabilityError::NotSupported(_)) => {}
            other => other?,
        }
        match storage::sync_parent_dir(&*self.dir, path) {
            Err(DurabilityError::NotSupported(_)) => {}
            other => other?,
        }
        Ok(())
    }

    fn verify(&self, path: &str, log_generation: u64) -> DurabilityResult<()> {
        let mut reader = BufReader::new(self.dir.open_file(path)?);
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
        match parse_log_pointer(&pointer) {
            Some(g) if g == log_generation => Ok(()),
            Some(g) => Err(DurabilityError::Format(format!(
                "pointer names generation {g}, expected {log_generation}"
            ))),
            None => Err(DurabilityError::Format(format!(
                "bad pointer line {pointer:?}"
            ))),
        }
    }
}
