//! Benchmarks for dsarchive
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use dsarchive::batch::{Batcher, SizeBounds};
use dsarchive::collect::FileDescriptor;
use dsarchive::report::RunReport;
use std::path::PathBuf;

const GIB: u64 = 1024 * 1024 * 1024;

/// Deterministic file sizes between 0 and 200 GiB
fn synthetic_files(count: usize) -> Vec<FileDescriptor> {
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..count)
        .map(|i| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            FileDescriptor {
                path: PathBuf::from(format!("/data/ds{}/f{}.nc", i % 7, i)),
                dataset_id: format!("ds{}", i % 7),
                relative_path: format!("f{}.nc", i),
                size: seed % (200 * GIB),
                mtime: 0,
                mode: 0o100644,
                uid: 0,
                gid: 0,
            }
        })
        .collect()
}

fn benchmark_batch_all(c: &mut Criterion) {
    let files = synthetic_files(100_000);

    c.bench_function("batch_all_100k", |b| {
        b.iter_batched(
            || files.clone(),
            |files| {
                let mut report = RunReport::new();
                let batches = Batcher::batch_all(SizeBounds::default(), files, &mut report);
                black_box(batches);
            },
            BatchSize::LargeInput,
        )
    });
}

fn benchmark_dataset_ids(c: &mut Criterion) {
    let files = synthetic_files(10_000);
    let mut report = RunReport::new();
    let batches = Batcher::batch_all(SizeBounds::default(), files, &mut report);

    c.bench_function("batch_dataset_ids", |b| {
        b.iter(|| {
            for batch in &batches {
                black_box(batch.dataset_ids());
            }
        })
    });
}

criterion_group!(benches, benchmark_batch_all, benchmark_dataset_ids);
criterion_main!(benches);
