//! On-disk naming, version header, and line-format constants.
//!
//! ## Public invariants (must not change without a version bump)
//!
//! - **Log segments** are named `logs.<generation>`; **checkpoints** are
//!   named `ckpt.<generation>`; both live at the root of the log directory.
//! - **Generations** are monotonically increasing and shared between the two
//!   name families: checkpoint generation `G` always points at log generation
//!   `G + 1`.
//! - **Version header**: line 1 of every segment and checkpoint is
//!   [`VERSION_LINE`], compared by prefix on read.
//! - **Pointer line**: line 2 of a checkpoint is `log: logs.<G+1>`; the
//!   generation is the text after the final `.` separator.
//! - **Line length** is bounded at [`MAX_LINE_LEN`] bytes including the
//!   trailing newline. Checksums for a large chunk can make a long line.

use crate::error::{DurabilityError, DurabilityResult};
use std::io::BufRead;

/// Version header written as the first line of every log segment and checkpoint.
pub const VERSION_LINE: &str = "version: 1";

/// Upper bound on the byte length of a single log or checkpoint line.
pub const MAX_LINE_LEN: usize = 32768;

/// Generation a fresh deployment starts from, and the generation recovery
/// replays when no checkpoint pointer is available.
pub const DEFAULT_GENERATION: u64 = 1;

/// Name of the hard-link alias to the newest checkpoint.
pub const LATEST_CHECKPOINT: &str = "ckpt_latest";

/// File name of the log segment for `generation`.
pub fn log_segment_name(generation: u64) -> String {
    format!("logs.{generation}")
}

/// File name of the checkpoint for `generation`.
pub fn checkpoint_name(generation: u64) -> String {
    format!("ckpt.{generation}")
}

/// Pointer line stored in a checkpoint, naming the log segment that holds
/// every mutation recorded after the checkpoint.
pub fn log_pointer_line(log_generation: u64) -> String {
    format!("log: {}", log_segment_name(log_generation))
}

/// Parse a checkpoint pointer line back into a log generation.
///
/// The line must start with `log:`; the generation is whatever follows the
/// final `.` separator. Returns `None` for anything else.
pub fn parse_log_pointer(line: &str) -> Option<u64> {
    if !line.starts_with("log:") {
        return None;
    }
    let (_, raw) = line.rsplit_once('.')?;
    raw.parse::<u64>().ok()
}

/// Check a header line against [`VERSION_LINE`] by prefix compare.
pub fn version_matches(line: &str) -> bool {
    line.starts_with(VERSION_LINE)
}

/// Read one newline-terminated line with the [`MAX_LINE_LEN`] bound applied
/// *before* the bytes are buffered.
///
/// Returns `Ok(None)` at EOF. The trailing newline is stripped.
pub(crate) fn read_line_bounded<R: BufRead>(reader: &mut R) -> DurabilityResult<Option<String>> {
    let mut buf = Vec::new();
    let n = std::io::Read::take(&mut *reader, MAX_LINE_LEN as u64)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    } else if n == MAX_LINE_LEN {
        // Hit the cap without finding a newline: the line is oversized.
        return Err(DurabilityError::LineTooLong {
            len: n,
            max: MAX_LINE_LEN,
        });
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| DurabilityError::Decode(format!("non-utf8 line: {e}")))
}
