//! Criterion benchmarks for StackLab hot paths.
//!
//! Benchmarks:
//! 1. Indicator context build (all series for one data set)
//! 2. Bar loop against a prebuilt context
//! 3. Full backtest (build + loop)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stacklab_core::config::EngineConfig;
use stacklab_core::domain::Bar;
use stacklab_core::engine::{run_backtest, run_with_context, IndicatorContext};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.05).sin() * 20.0 + i as f64 * 0.01;
            let open = close - 0.3;
            Bar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: close + 1.5,
                low: open - 1.5,
                close,
                volume: 1_000_000.0,
            }
        })
        .collect()
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_context_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_build");
    let config = EngineConfig::default();
    for n in [1_000usize, 5_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| IndicatorContext::build(black_box(bars), &config.indicators))
        });
    }
    group.finish();
}

fn bench_bar_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("bar_loop");
    let config = EngineConfig::default();
    for n in [1_000usize, 5_000] {
        let ctx = IndicatorContext::build(&make_bars(n), &config.indicators);
        group.bench_with_input(BenchmarkId::from_parameter(n), &ctx, |b, ctx| {
            b.iter(|| run_with_context(black_box(ctx), &config))
        });
    }
    group.finish();
}

fn bench_full_backtest(c: &mut Criterion) {
    let bars = make_bars(2_500);
    let config = EngineConfig::default();
    c.bench_function("full_backtest_2500", |b| {
        b.iter(|| run_backtest(black_box(&bars), &config))
    });
}

criterion_group!(benches, bench_context_build, bench_bar_loop, bench_full_backtest);
criterion_main!(benches);
