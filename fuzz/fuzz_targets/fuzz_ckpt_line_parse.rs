#![no_main]

use chunklog::format::parse_log_pointer;
use chunklog::ChunkMetadata;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = ChunkMetadata::decode_line(line);
        let _ = parse_log_pointer(line);
    }
});
