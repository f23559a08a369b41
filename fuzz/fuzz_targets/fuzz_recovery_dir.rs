#![no_main]

use chunklog::storage::{Directory, MemoryDirectory};
use chunklog::{InMemoryChunkMap, RecoveryManager};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    // First half plays the checkpoint, second half the log segment.
    let split = data.len() / 2;
    let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
    dir.atomic_write("ckpt_latest", &data[..split]).unwrap();
    dir.atomic_write("logs.1", &data[split..]).unwrap();

    let mut map = InMemoryChunkMap::new();
    let _ = RecoveryManager::new(dir).recover(&mut map);
});
