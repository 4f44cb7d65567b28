//! Backtest runner: wires data, engine, window trimming and metrics.
//!
//! Indicators are always computed over the full supplied history; only the
//! outputs are trimmed to the scoring window. Bars before the window are
//! warm-up and influence indicator values only.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use stacklab_core::config::{EngineConfig, IndicatorConfig};
use stacklab_core::domain::{Bar, EquityPoint, TradeEvent};
use stacklab_core::engine::{run_with_context, IndicatorContext, RunResult};
use stacklab_core::fingerprint::RunFingerprint;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, RunConfig, Window};
use crate::data_loader::{load_source, LoadError};
use crate::metrics::PerformanceMetrics;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("fingerprint error: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Minimum warm-up in bars when deriving the fetch start from indicator windows.
pub const MIN_WARMUP_BARS: usize = 250;

/// Warm-up used by optimizer and validation runs unless overridden.
pub const DEFAULT_WARMUP_DAYS: i64 = 900;

/// Complete result of one backtest, trimmed to its scoring window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub fingerprint: RunFingerprint,
    pub config: EngineConfig,
    pub window: Window,
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeEvent>,
    /// Bars supplied to the engine, warm-up included.
    pub bar_count: usize,
    /// Supplied bars dated before the window start.
    pub warmup_bars: usize,
}

/// Calendar days of history to load before the window start.
///
/// Twice the longest indicator window (at least [`MIN_WARMUP_BARS`]), which
/// covers weekends and holidays on a daily calendar.
pub fn derived_warmup_days(ind: &IndicatorConfig) -> i64 {
    let bars = [
        ind.sma_long_term,
        ind.atr_window,
        ind.sma_slow,
        ind.macd_slow + 3 * ind.macd_signal,
        MIN_WARMUP_BARS,
    ]
    .into_iter()
    .max()
    .unwrap_or(MIN_WARMUP_BARS);
    2 * bars as i64
}

/// Date range to load so that `window` starts with formed indicators.
///
/// `warmup_days` overrides the derived warm-up when set.
pub fn fetch_range(window: Window, warmup_days: Option<i64>, ind: &IndicatorConfig) -> Window {
    let days = warmup_days.unwrap_or_else(|| derived_warmup_days(ind));
    Window::new(
        window.start.map(|s| s - Duration::days(days.max(0))),
        window.end,
    )
}

/// Keep equity points and trades dated inside `window`.
pub fn trim_to_window(result: RunResult, window: Window) -> (Vec<EquityPoint>, Vec<TradeEvent>) {
    let RunResult {
        equity_curve,
        trades,
        ..
    } = result;
    let equity = equity_curve
        .into_iter()
        .filter(|p| window.contains(p.date))
        .collect();
    let trades = trades
        .into_iter()
        .filter(|t| window.contains(t.date))
        .collect();
    (equity, trades)
}

/// Run one backtest on a prebuilt context and score the window.
///
/// The context may be shared across many calls (parameter search).
pub fn evaluate(ctx: &IndicatorContext, config: &EngineConfig, window: Window) -> PerformanceMetrics {
    let (equity, trades) = trim_to_window(run_with_context(ctx, config), window);
    PerformanceMetrics::compute(&equity, &trades)
}

/// Run a single backtest over `bars` (warm-up included) and trim to `window`.
pub fn run_single(
    bars: &[Bar],
    config: &EngineConfig,
    window: Window,
) -> Result<BacktestResult, RunError> {
    let ctx = IndicatorContext::build(bars, &config.indicators);
    run_on_context(&ctx, config, window)
}

/// [`run_single`] on an existing context.
pub fn run_on_context(
    ctx: &IndicatorContext,
    config: &EngineConfig,
    window: Window,
) -> Result<BacktestResult, RunError> {
    let bars = ctx.bars();
    let fingerprint = RunFingerprint::new(bars, config, window.start, window.end)?;
    let warmup_bars = window
        .start
        .map_or(0, |s| bars.iter().take_while(|b| b.date < s).count());

    let (equity_curve, trades) = trim_to_window(run_with_context(ctx, config), window);
    if equity_curve.is_empty() {
        warn!(
            symbol = %config.backtest.symbol,
            "no equity points inside the requested window"
        );
    }
    let metrics = PerformanceMetrics::compute(&equity_curve, &trades);

    info!(
        symbol = %config.backtest.symbol,
        bars = bars.len(),
        warmup_bars,
        trades = metrics.trade_count,
        final_equity = metrics.final_equity,
        cagr = metrics.cagr,
        max_drawdown = metrics.max_drawdown,
        "run complete"
    );

    Ok(BacktestResult {
        fingerprint,
        config: config.clone(),
        window,
        metrics,
        equity_curve,
        trades,
        bar_count: bars.len(),
        warmup_bars,
    })
}

/// Load data for a run file and execute it.
pub fn run_from_config(config: &RunConfig) -> Result<BacktestResult, RunError> {
    let source = config.data.source()?;
    let window = config.data.window();
    window.validate()?;
    let range = fetch_range(window, config.data.warmup_days, &config.indicators);
    let bars = load_source(&source, &config.backtest.symbol, range)?;
    run_single(&bars, &config.engine_config(), window)
}

/// First and last dates of a bar table.
pub fn date_span(bars: &[Bar]) -> Option<(NaiveDate, NaiveDate)> {
    Some((bars.first()?.date, bars.last()?.date))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn derived_warmup_uses_floor_of_250_bars() {
        assert_eq!(derived_warmup_days(&IndicatorConfig::default()), 500);
        let long = IndicatorConfig {
            sma_long_term: 300,
            ..IndicatorConfig::default()
        };
        assert_eq!(derived_warmup_days(&long), 600);
    }

    #[test]
    fn fetch_range_moves_start_only() {
        let w = Window::new(Some(date(2020, 1, 1)), Some(date(2020, 12, 31)));
        let r = fetch_range(w, Some(900), &IndicatorConfig::default());
        assert_eq!(r.start, Some(date(2020, 1, 1) - Duration::days(900)));
        assert_eq!(r.end, w.end);
        let open = fetch_range(Window::unbounded(), None, &IndicatorConfig::default());
        assert_eq!(open, Window::unbounded());
    }

    #[test]
    fn date_span_of_empty_is_none() {
        assert_eq!(date_span(&[]), None);
    }
}
