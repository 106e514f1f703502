//! Criterion benchmarks for the cache hot paths.
//!
//! Benchmarks:
//! 1. Daily incremental merge (one refreshed row onto years of history)
//! 2. Full-history merge onto an empty cache
//! 3. Derived-field annotation

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quotevault_core::data::{annotate, merge, MergeMode};
use quotevault_core::domain::{Bar, CachedSeries};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let base = NaiveDate::from_ymd_opt(2015, 1, 5)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Bar::ohlcv(
                base + Duration::days(i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000.0 + (i % 500_000) as f64,
            )
        })
        .collect()
}

fn bench_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_incremental");
    for n in [750usize, 2_500, 10_000] {
        let all = make_bars(n + 1);
        let cached = CachedSeries::from_bars(all[..n].to_vec());
        let last = all[n - 1].clone();
        let fresh = vec![last.clone(), all[n].clone()];
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                merge(
                    black_box(&cached),
                    black_box(fresh.clone()),
                    MergeMode::RefreshSession(last.date()),
                )
            })
        });
    }
    group.finish();
}

fn bench_full_history(c: &mut Criterion) {
    let fresh = make_bars(2_500);
    let empty = CachedSeries::default();
    c.bench_function("merge_full_history_2500", |b| {
        b.iter(|| merge(black_box(&empty), black_box(fresh.clone()), MergeMode::AppendOnly))
    });
}

fn bench_annotate(c: &mut Criterion) {
    let series = CachedSeries::from_bars(make_bars(10_000));
    c.bench_function("annotate_10000", |b| b.iter(|| annotate(black_box(&series))));
}

criterion_group!(benches, bench_incremental, bench_full_history, bench_annotate);
criterion_main!(benches);
