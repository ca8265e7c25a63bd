//! # Command Codec Benchmark
//!
//! Scene setup is dominated by parameter traffic: thousands of `SetParam`
//! frames batched into a handful of messages.
//!
//! Run with: cargo bench --package meridian_networking --bench codec_benchmark

// Benchmarks don't need docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meridian_core::ObjectKind;
use meridian_networking::work::{NewObject, SetParam};
use meridian_networking::{Work, WorkTypeRegistry};
use meridian_shared::{Handle, ReadStream, Vec3f, WriteStream};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A scene-setup batch: every fourth frame creates an object, the rest set
/// parameters of mixed kinds on it.
fn scene_batch(frames: usize) -> Vec<Work> {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut handle = Handle::NULL;
    (0..frames)
        .map(|i| {
            if i % 4 == 0 {
                handle = Handle::new(u32::try_from(i).unwrap_or(u32::MAX), 1);
                return NewObject::new(ObjectKind::Geometry, "spheres", handle).unwrap().into();
            }
            let work: Work = match rng.gen_range(0..3) {
                0 => SetParam::new(handle, "radius", rng.gen::<f32>()).into(),
                1 => SetParam::new(handle, "primID", rng.gen::<i32>()).into(),
                _ => SetParam::new(handle, "center", Vec3f::new(rng.gen(), rng.gen(), rng.gen())).into(),
            };
            work
        })
        .collect()
}

fn encode(batch: &[Work]) -> Vec<u8> {
    let mut stream = WriteStream::new();
    for work in batch {
        work.encode_frame(&mut stream);
    }
    stream.into_inner()
}

/// Benchmark: master side, encoding a batch.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_batch");

    for frames in [64, 4_096] {
        let batch = scene_batch(frames);
        group.throughput(Throughput::Elements(frames as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &batch, |b, batch| {
            b.iter(|| black_box(encode(batch)));
        });
    }

    group.finish();
}

/// Benchmark: worker side, decoding a batch through the registry.
fn bench_decode(c: &mut Criterion) {
    let registry = WorkTypeRegistry::with_defaults().unwrap();
    let mut group = c.benchmark_group("decode_batch");

    for frames in [64, 4_096] {
        let bytes = encode(&scene_batch(frames));
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(frames), &bytes, |b, bytes| {
            b.iter(|| {
                let mut stream = ReadStream::new(bytes);
                let mut decoded = 0;
                while !stream.is_exhausted() {
                    black_box(registry.decode(&mut stream).unwrap());
                    decoded += 1;
                }
                assert_eq!(decoded, frames);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
