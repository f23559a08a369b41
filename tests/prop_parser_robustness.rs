//! Robustness properties for the text parsers.
//!
//! These tests are not about accepting arbitrary input; they're about:
//! - never panicking on junk lines or junk files
//! - rejecting malformed input via explicit errors (or clean stops)
//! - keeping allocation bounded when count fields lie

use chunklog::format::parse_log_pointer;
use chunklog::storage::{Directory, MemoryDirectory};
use chunklog::{ChunkMetadata, InMemoryChunkMap, MutationOp, RecoveryManager};
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #![proptest_config(ProptestConfig {
        failure_persistence: None,
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn op_decode_never_panics_on_arbitrary_lines(line in ".{0,256}") {
        let _ = MutationOp::decode_line(&line);
    }

    #[test]
    fn metadata_decode_never_panics_on_arbitrary_lines(line in ".{0,256}") {
        let _ = ChunkMetadata::decode_line(&line);
    }

    #[test]
    fn pointer_parse_never_panics_on_arbitrary_lines(line in ".{0,128}") {
        let _ = parse_log_pointer(&line);
    }

    #[test]
    fn recovery_never_panics_on_arbitrary_files(
        ckpt_bytes in prop::collection::vec(any::<u8>(), 0..2048),
        log_bytes in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
        dir.atomic_write("ckpt_latest", &ckpt_bytes).unwrap();
        dir.atomic_write("logs.1", &log_bytes).unwrap();

        let mut map = InMemoryChunkMap::new();
        let _ = RecoveryManager::new(dir).recover(&mut map);
    }
}

#[test]
fn lying_count_fields_do_not_overallocate() {
    // The count token promises far more checksums than the line can carry;
    // the parser must fail cleanly instead of reserving that much.
    let line = format!("WRITE 1 1 0 {} 1 2 3", u64::MAX);
    assert!(MutationOp::decode_line(&line).is_err());

    let line = format!("1 2 3 4 {} 5", u64::MAX);
    assert_eq!(ChunkMetadata::decode_line(&line), None);
}

#[test]
fn oversized_log_line_stops_replay_cleanly() {
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    let mut body = b"version: 1\nALLOCATE 1 1 1\n".to_vec();
    body.extend(std::iter::repeat(b'9').take(chunklog::format::MAX_LINE_LEN + 16));
    dir.atomic_write("logs.1", &body).unwrap();

    let mut map = InMemoryChunkMap::new();
    let outcome = RecoveryManager::new(dir).recover(&mut map).unwrap();
    // The valid prefix applies; the unbounded tail is a stop, not a crash.
    assert_eq!(outcome.ops_replayed, 1);
    assert!(map.get(1).is_some());
}
