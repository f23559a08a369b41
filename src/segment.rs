//! Append-side handling of log segment files.
//!
//! Exactly one segment is open for append at a time; the log worker owns the
//! writer for the lifetime of its loop. Rotation never deletes old segments.

use crate::error::{DurabilityError, DurabilityResult};
use crate::format::{log_segment_name, MAX_LINE_LEN, VERSION_LINE};
use crate::record::MutationOp;
use crate::storage::{self, Directory};
use std::io::Write;
use std::sync::Arc;

/// Appends serialized mutations to the current log segment.
pub struct SegmentWriter {
    dir: Arc<dyn Directory>,
    generation: u64,
    path: String,
    file: Box<dyn Write + Send>,
    sync_on_flush: bool,
}

impl SegmentWriter {
    /// Open the segment for `generation` in append mode.
    ///
    /// The version header is written only when the file is created fresh;
    /// reopening the segment recovery replayed continues appending after its
    /// existing entries.
    pub fn open(
        dir: Arc<dyn Directory>,
        generation: u64,
        sync_on_flush: bool,
    ) -> DurabilityResult<Self> {
        let path = log_segment_name(generation);
        let write_header = !dir.exists(&path);
        let mut file = dir.append_file(&path)?;
        if write_header {
            writeln!(file, "{VERSION_LINE}")?;
            file.flush()?;
        }
        Ok(Self {
            dir,
            generation,
            path,
            file,
            sync_on_flush,
        })
    }

    /// Generation of the segment currently open for append.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Path of the segment currently open for append.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Append one mutation line. The bytes are not durable until [`flush`].
    ///
    /// [`flush`]: SegmentWriter::flush
    pub fn append_op(&mut self, op: &MutationOp) -> DurabilityResult<()> {
        let line = op.encode_line();
        if line.len() + 1 > MAX_LINE_LEN {
            return Err(DurabilityError::LineTooLong {
                len: line.len() + 1,
                max: MAX_LINE_LEN,
            });
        }
        writeln!(self.file, "{line}")?;
        Ok(())
    }

    /// Flush everything appended so far; one call covers a whole batch.
    pub fn flush(&mut self) -> DurabilityResult<()> {
        self.file.flush()?;
        if self.sync_on_flush {
            match storage::sync_file(&*self.dir, &self.path) {
                // Memory-backed directories cannot prove stable storage;
                // the flush above is their strongest barrier.
                Err(DurabilityError::NotSupported(_)) => {}
                other => other?,
            }
        }
        Ok(())
    }

    /// Close the current segment and start the next generation.
    ///
    /// The new segment is truncate-created with a fresh version header; its
    /// generation must equal the pointer line of the checkpoint that
    /// triggered the rotation. A failure here leaves the writer on the old
    /// segment and is fatal to the caller.
    pub fn rotate(&mut self) -> DurabilityResult<u64> {
        self.flush()?;
        let next = self.generation + 1;
        let path = log_segment_name(next);
        let mut file = self.dir.create_file(&path)?;
        writeln!(file, "{VERSION_LINE}")?;
        file.flush()?;
        self.generation = next;
        self.path = path;
        self.file = file;
        Ok(next)
    }
}
