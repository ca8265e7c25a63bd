//! # Handle Table Benchmark
//!
//! Every command resolves at least one handle, so lookup sits on the
//! dispatch hot path of every rank.
//!
//! Run with: `cargo bench --package meridian_core`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meridian_core::{BasicObject, HandleAllocator, ManagedObject, ObjectHandleTable, ObjectKind};

fn populate(count: usize) -> (ObjectHandleTable, Vec<meridian_shared::Handle>) {
    let mut allocator = HandleAllocator::new();
    let mut table = ObjectHandleTable::with_capacity(count);
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let handle = allocator.allocate();
            let object: Arc<dyn ManagedObject> = Arc::new(BasicObject::new(ObjectKind::Geometry, "mesh"));
            table.assign(handle, object).unwrap();
            handle
        })
        .collect();
    (table, handles)
}

/// Benchmark: resolve every live handle once.
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_lookup");

    for count in [1_000, 100_000] {
        let (table, handles) = populate(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &handles, |b, handles| {
            b.iter(|| {
                for handle in handles {
                    black_box(table.lookup(*handle).unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark: create-then-release churn through allocator and table.
fn bench_assign_release(c: &mut Criterion) {
    c.bench_function("assign_release_10k", |b| {
        let mut allocator = HandleAllocator::new();
        let mut table = ObjectHandleTable::new();
        b.iter(|| {
            let handles: Vec<_> = (0..10_000)
                .map(|_| {
                    let handle = allocator.allocate();
                    table
                        .assign(handle, Arc::new(BasicObject::new(ObjectKind::Light, "ambient")))
                        .unwrap();
                    handle
                })
                .collect();
            for handle in handles {
                table.release(handle).unwrap();
                allocator.free(handle);
            }
        });
    });
}

criterion_group!(benches, bench_lookup, bench_assign_release);
criterion_main!(benches);
