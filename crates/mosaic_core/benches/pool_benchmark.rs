//! # Pool Allocator Benchmark
//!
//! Measures:
//! - Direct-fit churn (allocate/deallocate pairs in a warm pool)
//! - Compaction cost for a fully fragmented arena
//! - Typed emplace/read round trips
//!
//! Run with: `cargo bench --package mosaic_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use mosaic_core::PoolAllocator;

/// Arena size used by every benchmark.
const POOL_BYTES: usize = 1 << 20;

/// Benchmark: allocate/free pairs that always find a direct fit.
fn bench_direct_fit_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_fit_churn");

    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut pool = PoolAllocator::new(POOL_BYTES);
            // Keep half the pool live so the search has work to do.
            let _resident: Vec<_> = (0..POOL_BYTES / (2 * size))
                .map(|_| pool.allocate(size).unwrap())
                .collect();
            b.iter(|| {
                let h = pool.allocate(black_box(size)).unwrap();
                pool.deallocate(h).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark: one compaction over every other block freed.
fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");

    for block in [64usize, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(block), &block, |b, &block| {
            b.iter_batched(
                || {
                    let mut pool = PoolAllocator::new(POOL_BYTES);
                    let handles: Vec<_> = (0..POOL_BYTES / block)
                        .map(|_| pool.allocate(block).unwrap())
                        .collect();
                    for h in handles.iter().step_by(2) {
                        pool.deallocate(*h).unwrap();
                    }
                    pool
                },
                |mut pool| {
                    // No hole fits twice the block size; this compacts.
                    black_box(pool.allocate(2 * block).unwrap());
                    pool
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Benchmark: typed placement round trip.
fn bench_typed_roundtrip(c: &mut Criterion) {
    c.bench_function("typed_emplace_take_u64x4", |b| {
        let mut pool = PoolAllocator::new(POOL_BYTES);
        b.iter(|| {
            let h = pool.emplace(black_box([1u64, 2, 3, 4])).unwrap();
            black_box(pool.take(h).unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_direct_fit_churn,
    bench_compaction,
    bench_typed_roundtrip
);
criterion_main!(benches);
