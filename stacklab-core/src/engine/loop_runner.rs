//! Bar-by-bar loop entry points.
//!
//! The context is built once per data set; each run owns a fresh
//! `PositionStateMachine` and walks bars 2 ..= n-2 strictly in order.

use super::context::IndicatorContext;
use super::state::RunResult;
use super::trader::PositionStateMachine;
use crate::config::EngineConfig;
use crate::domain::Bar;
use tracing::debug;

/// Build the indicator context for `bars` and run one backtest.
///
/// `bars` must already be canonical (sorted ascending, unique dates, finite).
pub fn run_backtest(bars: &[Bar], config: &EngineConfig) -> RunResult {
    let ctx = IndicatorContext::build(bars, &config.indicators);
    run_with_context(&ctx, config)
}

/// Run one backtest against a prebuilt context. The indicator section of
/// `config` is ignored in favour of the context's own.
pub fn run_with_context(ctx: &IndicatorContext, config: &EngineConfig) -> RunResult {
    let trader = PositionStateMachine::new(ctx, &config.strategy, &config.costs, &config.backtest);
    let result = trader.run();

    debug!(
        symbol = %config.backtest.symbol,
        bars = ctx.len(),
        processed = result.bar_count,
        trades = result.trades.len(),
        final_equity = result.final_equity().unwrap_or(f64::NAN),
        "backtest complete"
    );
    result
}
