//! Random parameter search over a compact strategy grid.
//!
//! Each evaluation draws its parameters from its own RNG stream
//! (`RngHierarchy::rng_for("sweep", k)`), so the sampled configurations do
//! not depend on how rayon schedules the work. The indicator context is
//! built once by the caller and shared read-only by every evaluation.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stacklab_core::config::{EngineConfig, MacdSignalMode, StrategyConfig};
use stacklab_core::engine::IndicatorContext;
use stacklab_core::rng::RngHierarchy;
use tracing::info;

use crate::config::Window;
use crate::metrics::PerformanceMetrics;
use crate::runner::evaluate;

const SWEEP_STREAM: &str = "sweep";

/// Search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub n_evals: usize,
    pub seed: u64,
    pub dd_penalty: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            n_evals: 800,
            seed: 7,
            dd_penalty: 0.5,
        }
    }
}

/// Candidate values per strategy knob. Repeated values bias the draw.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpace {
    pub spread_enter_pct: Vec<f64>,
    pub spread_exit_pct: Vec<f64>,
    pub use_atr_filter: Vec<bool>,
    pub atr_enter_k: Vec<f64>,
    pub atr_exit_k: Vec<f64>,
    pub confirm_days: Vec<usize>,
    pub min_hold_bars: Vec<usize>,
    pub cooldown_bars: Vec<usize>,
    pub use_long_trend_filter: Vec<bool>,
    pub use_short_trend_filter: Vec<bool>,
    pub enable_short: Vec<bool>,
    pub long_daily_stop: Vec<f64>,
    pub long_trail_stop: Vec<f64>,
    pub short_daily_stop: Vec<f64>,
    pub short_trail_stop: Vec<f64>,
    pub use_prev_close_filter: Vec<bool>,
    pub use_macd_regime_filter: Vec<bool>,
    pub use_macd_exit: Vec<bool>,
    pub macd_signal_mode: Vec<MacdSignalMode>,
    pub use_macd_size_scaling: Vec<bool>,
    pub macd_size_min: Vec<f64>,
    pub macd_size_max: Vec<f64>,
    pub macd_size_atr_k: Vec<f64>,
}

impl Default for ParamSpace {
    fn default() -> Self {
        Self {
            spread_enter_pct: vec![0.0015, 0.0020, 0.0030, 0.0040, 0.0050],
            spread_exit_pct: vec![0.0003, 0.0007, 0.0010, 0.0015],
            use_atr_filter: vec![true, true, true, false],
            atr_enter_k: vec![0.10, 0.15, 0.25, 0.35, 0.50, 0.70],
            atr_exit_k: vec![0.05, 0.10, 0.20],
            confirm_days: vec![1, 2, 3, 4],
            min_hold_bars: vec![1, 3, 5, 7],
            cooldown_bars: vec![0, 2, 5, 10],
            use_long_trend_filter: vec![true, true, false],
            use_short_trend_filter: vec![false, false, true],
            enable_short: vec![true, true, true, false],
            long_daily_stop: vec![0.02, 0.03, 0.05, 0.08],
            long_trail_stop: vec![0.06, 0.10, 0.15],
            short_daily_stop: vec![0.02, 0.03, 0.05, 0.08],
            short_trail_stop: vec![0.06, 0.10, 0.15],
            use_prev_close_filter: vec![false, false, true],
            use_macd_regime_filter: vec![false, false, true],
            use_macd_exit: vec![false, false, true],
            macd_signal_mode: vec![MacdSignalMode::Cross, MacdSignalMode::Hist],
            use_macd_size_scaling: vec![false, false, true],
            macd_size_min: vec![0.5, 0.6, 0.7],
            macd_size_max: vec![0.9, 1.0],
            macd_size_atr_k: vec![0.8, 1.0, 1.2],
        }
    }
}

/// One value from `values`, or `fallback` for an empty candidate list.
fn pick<T: Copy, R: Rng + ?Sized>(rng: &mut R, values: &[T], fallback: T) -> T {
    values.choose(rng).copied().unwrap_or(fallback)
}

impl ParamSpace {
    /// Draw one strategy. Knobs outside the space keep `base` values, except
    /// that single-unit mode is forced and pyramiding/give-up are disabled.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, base: &StrategyConfig) -> StrategyConfig {
        let b = base;
        let mut cfg = StrategyConfig {
            spread_enter_pct: pick(rng, &self.spread_enter_pct, b.spread_enter_pct),
            spread_exit_pct: pick(rng, &self.spread_exit_pct, b.spread_exit_pct),
            use_atr_filter: pick(rng, &self.use_atr_filter, b.use_atr_filter),
            atr_enter_k: pick(rng, &self.atr_enter_k, b.atr_enter_k),
            atr_exit_k: pick(rng, &self.atr_exit_k, b.atr_exit_k),
            confirm_days: pick(rng, &self.confirm_days, b.confirm_days),
            min_hold_bars: pick(rng, &self.min_hold_bars, b.min_hold_bars),
            cooldown_bars: pick(rng, &self.cooldown_bars, b.cooldown_bars),
            use_long_trend_filter: pick(rng, &self.use_long_trend_filter, b.use_long_trend_filter),
            use_short_trend_filter: pick(
                rng,
                &self.use_short_trend_filter,
                b.use_short_trend_filter,
            ),
            enable_short: pick(rng, &self.enable_short, b.enable_short),
            long_daily_stop: pick(rng, &self.long_daily_stop, b.long_daily_stop),
            long_trail_stop: pick(rng, &self.long_trail_stop, b.long_trail_stop),
            short_daily_stop: pick(rng, &self.short_daily_stop, b.short_daily_stop),
            short_trail_stop: pick(rng, &self.short_trail_stop, b.short_trail_stop),
            use_prev_close_filter: pick(rng, &self.use_prev_close_filter, b.use_prev_close_filter),
            use_macd_regime_filter: pick(
                rng,
                &self.use_macd_regime_filter,
                b.use_macd_regime_filter,
            ),
            use_macd_exit: pick(rng, &self.use_macd_exit, b.use_macd_exit),
            macd_signal_mode: pick(rng, &self.macd_signal_mode, b.macd_signal_mode),
            use_macd_size_scaling: pick(rng, &self.use_macd_size_scaling, b.use_macd_size_scaling),
            macd_size_min: pick(rng, &self.macd_size_min, b.macd_size_min),
            macd_size_max: pick(rng, &self.macd_size_max, b.macd_size_max),
            macd_size_atr_k: pick(rng, &self.macd_size_atr_k, b.macd_size_atr_k),
            max_units: 1,
            pyramid_step_return: 1e9,
            give_up_max_bars: 0,
            give_up_drawdown_pct: 0.0,
            ..b.clone()
        };
        if cfg.macd_size_min > cfg.macd_size_max {
            std::mem::swap(&mut cfg.macd_size_min, &mut cfg.macd_size_max);
        }
        cfg
    }

    /// Number of distinct grid points (duplicated candidates counted once each).
    pub fn size(&self) -> usize {
        fn distinct<T: PartialEq>(v: &[T]) -> usize {
            v.iter()
                .enumerate()
                .filter(|&(i, x)| !v[..i].contains(x))
                .count()
                .max(1)
        }
        [
            distinct(&self.spread_enter_pct),
            distinct(&self.spread_exit_pct),
            distinct(&self.use_atr_filter),
            distinct(&self.atr_enter_k),
            distinct(&self.atr_exit_k),
            distinct(&self.confirm_days),
            distinct(&self.min_hold_bars),
            distinct(&self.cooldown_bars),
            distinct(&self.use_long_trend_filter),
            distinct(&self.use_short_trend_filter),
            distinct(&self.enable_short),
            distinct(&self.long_daily_stop),
            distinct(&self.long_trail_stop),
            distinct(&self.short_daily_stop),
            distinct(&self.short_trail_stop),
            distinct(&self.use_prev_close_filter),
            distinct(&self.use_macd_regime_filter),
            distinct(&self.use_macd_exit),
            distinct(&self.macd_signal_mode),
            distinct(&self.use_macd_size_scaling),
            distinct(&self.macd_size_min),
            distinct(&self.macd_size_max),
            distinct(&self.macd_size_atr_k),
        ]
        .into_iter()
        .fold(1usize, |acc, n| acc.saturating_mul(n))
    }
}

/// One scored evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    /// Sample order, `0..n_evals`.
    pub index: usize,
    pub strategy: StrategyConfig,
    pub metrics: PerformanceMetrics,
    pub score: f64,
}

/// Evaluations sorted best-first. Ties keep sample order.
#[derive(Debug, Clone)]
pub struct SweepResults {
    entries: Vec<SweepEntry>,
}

impl SweepResults {
    fn new(mut entries: Vec<SweepEntry>) -> Self {
        // stable: equal scores stay in sample order
        entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self { entries }
    }

    pub fn all(&self) -> &[SweepEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best(&self) -> Option<&SweepEntry> {
        self.entries.first()
    }

    pub fn top_n(&self, n: usize) -> &[SweepEntry] {
        &self.entries[..n.min(self.entries.len())]
    }
}

/// Draw and score `sweep.n_evals` strategies on `window`.
///
/// Indicator, cost and backtest records come from `base`; only the strategy
/// is sampled.
pub fn run_sweep(
    ctx: &IndicatorContext,
    base: &EngineConfig,
    window: Window,
    sweep: &SweepConfig,
    space: &ParamSpace,
) -> SweepResults {
    let rngs = RngHierarchy::new(sweep.seed);
    let done = AtomicUsize::new(0);
    let report_every = (sweep.n_evals / 20).max(1);

    let entries: Vec<SweepEntry> = (0..sweep.n_evals)
        .into_par_iter()
        .map(|k| {
            let mut rng = rngs.rng_for(SWEEP_STREAM, k as u64);
            let strategy = space.sample(&mut rng, &base.strategy);
            let config = EngineConfig {
                strategy,
                ..base.clone()
            };
            let metrics = evaluate(ctx, &config, window);
            let score = metrics.score(sweep.dd_penalty);

            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            if n % report_every == 0 {
                info!(done = n, total = sweep.n_evals, "sweep progress");
            }

            SweepEntry {
                index: k,
                strategy: config.strategy,
                metrics,
                score,
            }
        })
        .collect();

    let results = SweepResults::new(entries);
    if let Some(best) = results.best() {
        info!(
            evals = results.len(),
            best_index = best.index,
            best_score = best.score,
            cagr = best.metrics.cagr,
            max_drawdown = best.metrics.max_drawdown,
            "sweep complete"
        );
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_deterministic_per_stream() {
        let rngs = RngHierarchy::new(7);
        let space = ParamSpace::default();
        let base = StrategyConfig::default();
        let a = space.sample(&mut rngs.rng_for(SWEEP_STREAM, 3), &base);
        let b = space.sample(&mut rngs.rng_for(SWEEP_STREAM, 3), &base);
        assert_eq!(a, b);
    }

    #[test]
    fn samples_stay_in_single_unit_mode() {
        let rngs = RngHierarchy::new(11);
        let space = ParamSpace::default();
        let base = StrategyConfig {
            max_units: 4,
            give_up_max_bars: 10,
            ..StrategyConfig::default()
        };
        for k in 0..200 {
            let s = space.sample(&mut rngs.rng_for(SWEEP_STREAM, k), &base);
            assert_eq!(s.max_units, 1);
            assert_eq!(s.give_up_max_bars, 0);
            assert_eq!(s.pyramid_step_return, 1e9);
            assert!(s.macd_size_min <= s.macd_size_max);
            assert!(space.spread_enter_pct.contains(&s.spread_enter_pct));
            assert!(space.confirm_days.contains(&s.confirm_days));
        }
    }

    #[test]
    fn inverted_scaling_bounds_are_swapped() {
        let space = ParamSpace {
            macd_size_min: vec![0.9],
            macd_size_max: vec![0.4],
            ..ParamSpace::default()
        };
        let mut rng = RngHierarchy::new(1).rng_for(SWEEP_STREAM, 0);
        let s = space.sample(&mut rng, &StrategyConfig::default());
        assert_eq!((s.macd_size_min, s.macd_size_max), (0.4, 0.9));
    }

    #[test]
    fn empty_candidate_list_keeps_base_value() {
        let space = ParamSpace {
            cooldown_bars: vec![],
            ..ParamSpace::default()
        };
        let base = StrategyConfig {
            cooldown_bars: 42,
            ..StrategyConfig::default()
        };
        let s = space.sample(&mut RngHierarchy::new(1).rng_for(SWEEP_STREAM, 0), &base);
        assert_eq!(s.cooldown_bars, 42);
    }

    #[test]
    fn grid_size_counts_distinct_values() {
        let space = ParamSpace::default();
        // use_atr_filter has 4 candidates but 2 distinct values
        let one = ParamSpace {
            use_atr_filter: vec![true],
            ..space.clone()
        };
        assert_eq!(space.size(), one.size() * 2);
    }

    #[test]
    fn results_sort_best_first_with_stable_ties() {
        let entry = |index, score| SweepEntry {
            index,
            strategy: StrategyConfig::default(),
            metrics: PerformanceMetrics {
                final_equity: 1.0,
                total_return: 0.0,
                cagr: 0.0,
                max_drawdown: 0.0,
                trade_count: 0,
            },
            score,
        };
        let r = SweepResults::new(vec![
            entry(0, 0.1),
            entry(1, f64::NEG_INFINITY),
            entry(2, 0.3),
            entry(3, 0.1),
        ]);
        let order: Vec<usize> = r.all().iter().map(|e| e.index).collect();
        assert_eq!(order, vec![2, 0, 3, 1]);
        assert_eq!(r.best().map(|e| e.index), Some(2));
        assert_eq!(r.top_n(10).len(), 4);
    }
}
