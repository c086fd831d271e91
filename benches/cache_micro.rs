//! Micro-benchmarks for the operation and tuple caches.
//!
//! Run with:
//! ```bash
//! cargo bench --bench cache_micro
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use mdd_rs::cache::{OpCache, TupleCache};
use mdd_rs::forest::Forest;

fn bench_op_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("op_cache");
    let n: i32 = 4096;
    group.throughput(Throughput::Elements(n as u64));

    group.bench_function("add2", |b| {
        b.iter(|| {
            let mut cache = OpCache::new();
            for i in 0..n {
                cache.add2(i, i, i + 1);
            }
            cache
        })
    });

    let mut cache = OpCache::new();
    for i in 0..n {
        cache.add2(i, i, i + 1);
    }
    group.bench_function("hit2", |b| {
        b.iter(|| {
            let mut found = 0;
            for i in 0..n {
                if cache.hit2(black_box(i), black_box(i + 1)).is_some() {
                    found += 1;
                }
            }
            found
        })
    });
    group.finish();
}

fn bench_tuple_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("tuple_cache");
    let n: i32 = 1024;
    group.throughput(Throughput::Elements(n as u64));

    let mut cache = TupleCache::new();
    for i in 0..n {
        cache.add(i, &[i, i + 1, i + 2, i + 3]);
    }
    group.bench_function("hit_4wide", |b| {
        b.iter(|| {
            let mut found = 0;
            for i in 0..n {
                let key = [black_box(i), i + 1, i + 2, i + 3];
                if cache.hit(&key).is_some() {
                    found += 1;
                }
            }
            found
        })
    });
    group.finish();
}

fn bench_union_workload(c: &mut Criterion) {
    // A realistic workload: repeated unions over 4 levels, exercising the
    // canonical tables and the max cache together.
    c.bench_function("union_4levels", |b| {
        b.iter(|| {
            let mut f = Forest::new(4, &[1, 7, 7, 7, 7]);
            let mut acc = f.mdd_from_range(&[0; 5], &[0; 5]).unwrap();
            for i in 0..8 {
                let low = [1, i, 0, i, 0];
                let high = [1, i, 7, i, 7];
                let rule = f.mdd_from_range(&low, &high).unwrap();
                let merged = f.max(&acc, &rule).unwrap();
                f.destroy_mdd(acc);
                f.destroy_mdd(rule);
                acc = merged;
            }
            f.count_tuples(&acc).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_op_cache,
    bench_tuple_cache,
    bench_union_workload
);
criterion_main!(benches);
