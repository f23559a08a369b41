//! End-to-end tests for the checkpoint/rotation protocol.

use chunklog::format::{checkpoint_name, log_segment_name, parse_log_pointer};
use chunklog::storage::{Directory, FsDirectory};
use chunklog::{ChunkMap, InMemoryChunkMap, LogEngine, LogEngineOptions, MutationOp, OpRecord};
use std::io::Read;
use std::sync::Arc;

fn read_lines(dir: &Arc<dyn Directory>, path: &str) -> Vec<String> {
    let mut out = String::new();
    dir.open_file(path)
        .unwrap()
        .read_to_string(&mut out)
        .unwrap();
    out.lines().map(str::to_string).collect()
}

#[test]
fn n_checkpoint_cycles_keep_the_linkage_invariant() {
    let tmp = tempfile::tempdir().unwrap();
    let dir: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
    let engine = LogEngine::start(dir.clone(), LogEngineOptions::default()).unwrap();

    let mut live = InMemoryChunkMap::new();
    for cycle in 0..5i64 {
        engine
            .submit(OpRecord::new(MutationOp::Allocate {
                chunk_id: cycle,
                file_id: 1,
                version: 1,
            }))
            .unwrap();
        live.replay_alloc_chunk(1, cycle, 1);
        let receipt = engine.checkpoint(live.snapshot()).unwrap();
        assert_eq!(receipt.generation, (cycle + 1) as u64);
        assert_eq!(receipt.log_generation, receipt.generation + 1);
    }
    engine.shutdown().unwrap();

    // Every checkpoint G points at G+1, and that segment exists with the
    // right header.
    for generation in 1..=5u64 {
        let lines = read_lines(&dir, &checkpoint_name(generation));
        assert_eq!(lines[0], "version: 1");
        assert_eq!(parse_log_pointer(&lines[1]), Some(generation + 1));

        let segment = read_lines(&dir, &log_segment_name(generation + 1));
        assert_eq!(segment[0], "version: 1");
    }
    // Five cycles leave six segments; none were reclaimed.
    for generation in 1..=6u64 {
        assert!(dir.exists(&log_segment_name(generation)));
    }
}

#[test]
fn alias_tracks_the_newest_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let dir: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
    let engine = LogEngine::start(dir.clone(), LogEngineOptions::default()).unwrap();

    engine.checkpoint(String::new()).unwrap();
    let first = read_lines(&dir, "ckpt_latest");
    engine.checkpoint(String::new()).unwrap();
    let second = read_lines(&dir, "ckpt_latest");
    engine.shutdown().unwrap();

    assert_eq!(parse_log_pointer(&first[1]), Some(2));
    assert_eq!(parse_log_pointer(&second[1]), Some(3));
    assert_eq!(second, read_lines(&dir, "ckpt.2"));
}

#[test]
fn mutations_around_a_checkpoint_land_in_the_right_segments() {
    let tmp = tempfile::tempdir().unwrap();
    let dir: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
    let engine = LogEngine::start(dir.clone(), LogEngineOptions::default()).unwrap();

    engine
        .submit(OpRecord::new(MutationOp::Allocate {
            chunk_id: 1,
            file_id: 1,
            version: 1,
        }))
        .unwrap();
    engine.checkpoint("1 1 0 1 0\n".to_string()).unwrap();
    engine
        .submit(OpRecord::new(MutationOp::Delete { chunk_id: 1 }))
        .unwrap();
    engine.shutdown().unwrap();

    assert_eq!(
        read_lines(&dir, "logs.1"),
        vec!["version: 1", "ALLOCATE 1 1 1"]
    );
    assert_eq!(read_lines(&dir, "logs.2"), vec!["version: 1", "DELETE 1"]);
}

#[test]
fn sync_on_flush_engine_behaves_identically_on_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let dir: Arc<dyn Directory> = Arc::new(FsDirectory::new(tmp.path()).unwrap());
    let engine = LogEngine::start(
        dir.clone(),
        LogEngineOptions {
            sync_on_flush: true,
            ..LogEngineOptions::default()
        },
    )
    .unwrap();

    engine
        .submit(OpRecord::new(MutationOp::TruncateDone {
            chunk_id: 9,
            size: 4096,
        }))
        .unwrap();
    engine.checkpoint(String::new()).unwrap();
    engine.shutdown().unwrap();

    assert_eq!(
        read_lines(&dir, "logs.1"),
        vec!["version: 1", "TRUNCATE 9 4096"]
    );
    assert_eq!(read_lines(&dir, "logs.2"), vec!["version: 1"]);
}
