// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Ring write/read throughput at three payload sizes relative to a 4096-byte
// node:
//   small  — 48 bytes   (well under one node)
//   medium — 4096 bytes (exactly one node)
//   large  — 65536 bytes (spans many nodes, exercises the per-node loop)
//
// Run with: cargo bench --bench ring_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringmem_ipc::CircularBuffer;
use std::sync::atomic::{AtomicUsize, Ordering};

const NODE_SIZE: u32 = 4096;
const NODE_COUNT: u32 = 256;

const SIZES: &[(&str, usize)] = &[("small_48", 48), ("medium_4096", 4096), ("large_65536", 65536)];

fn unique_name(prefix: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "/ringmem_bench_{prefix}_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn bench_write_read_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_write_read");
    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &size| {
            let name = unique_name(label);
            let buf = CircularBuffer::open_or_create(&name, NODE_COUNT, NODE_SIZE).unwrap();
            let payload = vec![0xABu8; size];
            let mut dst = vec![0u8; size];
            b.iter(|| {
                buf.write(black_box(&payload), 1000).unwrap();
                buf.read(black_box(&mut dst), 1000).unwrap();
            });
            buf.close();
        });
    }
    group.finish();
}

criterion_group!(benches, bench_write_read_round_trip);
criterion_main!(benches);
