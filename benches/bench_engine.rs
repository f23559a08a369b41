//! Benchmarks for the logging pipeline (codec + engine throughput).
#![allow(missing_docs)]

use chunklog::storage::{Directory, MemoryDirectory};
use chunklog::{LogEngine, LogEngineOptions, MutationOp, OpRecord};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::Arc;

fn write_op(i: u64) -> MutationOp {
    MutationOp::WriteDone {
        chunk_id: (i % 512) as i64,
        size: 65536,
        offset: 0,
        checksums: vec![crc32fast::hash(&i.to_le_bytes())],
    }
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("logline");

    group.bench_function("encode_write", |b| {
        let op = write_op(7);
        b.iter(|| std::hint::black_box(op.encode_line()));
    });

    group.bench_function("decode_write", |b| {
        let line = write_op(7).encode_line();
        b.iter(|| std::hint::black_box(MutationOp::decode_line(&line).unwrap()));
    });

    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    group.bench_function("submit_drain_10k_memory", |b| {
        b.iter_batched(
            || {
                let dir: Arc<dyn Directory> = Arc::new(MemoryDirectory::new());
                LogEngine::start(dir, LogEngineOptions::default()).unwrap()
            },
            |engine| {
                for i in 0..10_000u64 {
                    engine.submit(OpRecord::new(write_op(i))).unwrap();
                }
                engine.shutdown().unwrap();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_engine);
criterion_main!(benches);
