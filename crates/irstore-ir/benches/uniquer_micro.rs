use criterion::{
    black_box, criterion_group, criterion_main, Bencher, BenchmarkId, Criterion, Throughput,
};
use irstore_ir::{ArrayAttr, Context, ContextConfig, IntegerAttr, IntegerType, StringAttr, UniquerConfig};
use std::thread;

fn bench_get_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniquer_get_hit");
    for &n in &[1_000i64, 10_000] {
        let ctx = Context::new();
        let int = IntegerType::signless(&ctx, 64).unwrap().as_type();
        for v in 0..n {
            IntegerAttr::get(&ctx, int, v).unwrap();
        }

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("integer_attr", n), &n, |b: &mut Bencher, &n| {
            b.iter(|| {
                for v in 0..n {
                    black_box(IntegerAttr::get(&ctx, int, v).unwrap());
                }
            })
        });
    }
    group.finish();
}

fn bench_get_misses(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniquer_get_miss");
    for &n in &[1_000usize, 10_000] {
        let names: Vec<String> = (0..n).map(|i| format!("symbol_{i}")).collect();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("string_attr", n), &n, |b: &mut Bencher, _| {
            b.iter(|| {
                let ctx = Context::new();
                for name in &names {
                    black_box(StringAttr::get(&ctx, name).unwrap());
                }
                black_box(ctx.attribute_uniquer().arena_bytes())
            })
        });
    }
    group.finish();
}

fn bench_concurrent_lookups(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniquer_concurrent");
    let threads = num_threads();
    for &(label, threading) in &[("sharded", true), ("single_lock", false)] {
        let config = ContextConfig {
            uniquer: if threading {
                UniquerConfig::default()
            } else {
                UniquerConfig::single_threaded()
            },
            ..ContextConfig::default()
        };
        let ctx = Context::with_config(config).unwrap();
        let elements: Vec<_> = (0..16)
            .map(|i| IntegerAttr::index(&ctx, i).unwrap().as_attribute())
            .collect();

        group.throughput(Throughput::Elements((threads * 1_000) as u64));
        group.bench_function(BenchmarkId::new("array_attr", label), |b| {
            b.iter(|| {
                thread::scope(|scope| {
                    for t in 0..threads {
                        let ctx = &ctx;
                        let elements = &elements;
                        scope.spawn(move || {
                            for i in 0..1_000usize {
                                let len = (i + t) % elements.len() + 1;
                                black_box(ArrayAttr::get(ctx, &elements[..len]).unwrap());
                            }
                        });
                    }
                })
            })
        });
    }
    group.finish();
}

fn num_threads() -> usize {
    thread::available_parallelism().map_or(4, |n| n.get().min(8))
}

criterion_group!(benches, bench_get_hits, bench_get_misses, bench_concurrent_lookups);
criterion_main!(benches);
