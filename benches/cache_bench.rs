//! Query cache benchmarks
//!
//! Run with: cargo bench --bench cache_bench
//!
//! Compares the lookup path per arity once the descriptor is cached, and the
//! cost of the first-use insertion.

use archetype_query::{ComponentId, QueryCache};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn ids(arity: u32) -> Vec<ComponentId> {
    // Reverse order so every lookup has to sort
    (1..=arity).rev().map(ComponentId::from_raw).collect()
}

fn bench_cached_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_hit");
    let cache = QueryCache::new(0);

    for arity in [1u32, 2, 3, 8, 16] {
        let set = ids(arity);
        cache.get_or_create(&set).expect("arity in range");
        group.bench_with_input(BenchmarkId::from_parameter(arity), &set, |b, set| {
            b.iter(|| black_box(cache.get_or_create(black_box(set)).expect("cached")));
        });
    }

    group.finish();
}

fn bench_first_use(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_miss");

    for arity in [1u32, 2, 8, 16] {
        let set = ids(arity);
        group.bench_with_input(BenchmarkId::from_parameter(arity), &set, |b, set| {
            b.iter(|| {
                let cache = QueryCache::new(0);
                black_box(cache.get_or_create(set).expect("arity in range"))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cached_lookup, bench_first_use);
criterion_main!(benches);
