use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use memtable::KeyValuePair;
use metrics::IoCounters;
use run::Run;
use tempfile::tempdir;

const N_KEYS: i64 = 10_000;

fn build_pairs() -> Vec<KeyValuePair> {
    (0..N_KEYS).map(|k| KeyValuePair::new(k, k * 7)).collect()
}

fn run_create_benchmark(c: &mut Criterion) {
    c.bench_function("run_create_10k", |b| {
        b.iter_batched(
            || (tempdir().unwrap(), build_pairs()),
            |(dir, pairs)| {
                Run::create(dir.path(), 1, 0, &pairs, 0.01, IoCounters::new()).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn run_get_hit_benchmark(c: &mut Criterion) {
    c.bench_function("run_get_hit_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let pairs = build_pairs();
                let run = Run::create(dir.path(), 1, 0, &pairs, 0.01, IoCounters::new()).unwrap();
                (dir, run)
            },
            |(_dir, run)| {
                for k in 0..N_KEYS {
                    assert!(run.get(k).unwrap().is_some());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn run_get_miss_benchmark(c: &mut Criterion) {
    c.bench_function("run_get_miss_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let pairs = build_pairs();
                let run = Run::create(dir.path(), 1, 0, &pairs, 0.01, IoCounters::new()).unwrap();
                (dir, run)
            },
            |(_dir, run)| {
                // All misses; the bloom filter should absorb nearly all of
                // these without touching the data file.
                for k in N_KEYS..2 * N_KEYS {
                    assert!(run.get(k).unwrap().is_none());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn run_range_benchmark(c: &mut Criterion) {
    c.bench_function("run_range_1k_of_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let pairs = build_pairs();
                let run = Run::create(dir.path(), 1, 0, &pairs, 0.01, IoCounters::new()).unwrap();
                (dir, run)
            },
            |(_dir, run)| {
                let r = run.range(4000, 5000).unwrap();
                assert_eq!(r.len(), 1000);
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    run_create_benchmark,
    run_get_hit_benchmark,
    run_get_miss_benchmark,
    run_range_benchmark
);
criterion_main!(benches);
