#![no_main]

use chunklog::MutationOp;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = MutationOp::decode_line(line);
    }
});
