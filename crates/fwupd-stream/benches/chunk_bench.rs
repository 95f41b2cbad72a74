//! Benchmarks for chunking in-memory and streamed images

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fwupd_stream::{ChunkArray, StreamChunkArray};
use std::hint::black_box;
use std::io::Cursor;

fn bench_chunk_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_bytes");
    let data: Vec<u8> = (0..0x10_0000usize).map(|i| (i % 251) as u8).collect();
    group.throughput(Throughput::Bytes(data.len() as u64));

    for packet_size in [64usize, 4096, 8184] {
        group.bench_with_input(BenchmarkId::from_parameter(packet_size), &data, |b, data| {
            b.iter(|| {
                if let Ok(chunks) = ChunkArray::from_bytes(black_box(data), 0x8000_0000, 0x1000, packet_size) {
                    black_box(chunks.iter().map(|c| c.data_size()).sum::<usize>());
                }
            });
        });
    }

    group.finish();
}

fn bench_chunk_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_stream");
    let data: Vec<u8> = (0..0x4_0000usize).map(|i| (i % 251) as u8).collect();
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("read_all_8184", |b| {
        b.iter(|| {
            if let Ok(mut chunks) = StreamChunkArray::from_stream(Cursor::new(&data), 0, 0, 8184) {
                for idx in 0..chunks.len() {
                    black_box(chunks.index(idx).ok());
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_chunk_bytes, bench_chunk_stream);
criterion_main!(benches);
