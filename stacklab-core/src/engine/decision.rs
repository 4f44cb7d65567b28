//! Target decision for one bar.
//!
//! Every input comes from the lagged `PrevContext` (or, for the confirmation
//! window, from snapshots that end at bar `t - 1`).

use super::context::{IndicatorContext, PrevContext};
use crate::config::{MacdSignalMode, PrevCloseRef, StrategyConfig};
use crate::domain::{Direction, PositionState};

/// Separation gates for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Gates {
    enter_long: bool,
    exit_long: bool,
    enter_short: bool,
    exit_short: bool,
}

/// ATR multiples when the filter is on and ATR is usable, otherwise a
/// fraction of the fast MA magnitude.
fn separation_gates(prev: &PrevContext, cfg: &StrategyConfig) -> Gates {
    let sep_long = prev.sma_week - prev.sma_fast;
    let sep_short = prev.sma_fast - prev.sma_week;

    match prev.atr.filter(|a| cfg.use_atr_filter && *a > 0.0) {
        Some(atr) => Gates {
            enter_long: sep_long >= cfg.atr_enter_k * atr,
            exit_long: sep_long <= cfg.atr_exit_k * atr,
            enter_short: sep_short >= cfg.atr_enter_k * atr,
            exit_short: sep_short <= cfg.atr_exit_k * atr,
        },
        None => {
            let den = prev.sma_fast.abs().max(f64::MIN_POSITIVE);
            Gates {
                enter_long: sep_long / den >= cfg.spread_enter_pct,
                exit_long: sep_long / den <= cfg.spread_exit_pct,
                enter_short: sep_short / den >= cfg.spread_enter_pct,
                exit_short: sep_short / den <= cfg.spread_exit_pct,
            }
        }
    }
}

/// (bull, bear). Neither when MACD is unavailable.
pub fn macd_regime(prev: &PrevContext, mode: MacdSignalMode) -> (bool, bool) {
    match (prev.macd, mode) {
        (None, _) => (false, false),
        (Some(m), MacdSignalMode::Cross) => (m.line > m.signal, m.line < m.signal),
        (Some(m), MacdSignalMode::Hist) => (m.hist > 0.0, m.hist < 0.0),
    }
}

/// Desired direction for bar `t` given the current position.
pub fn decide_target(
    t: usize,
    prev: &PrevContext,
    ctx: &IndicatorContext,
    state: &PositionState,
    cfg: &StrategyConfig,
) -> Direction {
    if state.in_cooldown(t) {
        return Direction::Flat;
    }

    let week = prev.sma_week;
    let fast = prev.sma_fast;
    let slow = prev.sma_slow;

    let long_stack = week > fast && fast > slow;
    let short_stack = slow > fast && fast > week;

    let gates = separation_gates(prev, cfg);

    let trend_long_ok = !cfg.use_long_trend_filter || prev.trend == 1;
    let trend_short_ok = !cfg.use_short_trend_filter || prev.trend == -1;

    let (macd_bull, macd_bear) = macd_regime(prev, cfg.macd_signal_mode);
    let macd_long_ok = !cfg.use_macd_regime_filter || macd_bull;
    let macd_short_ok = !cfg.use_macd_regime_filter || macd_bear;

    let conf_n = cfg.confirm_days.max(1);
    let last = t.saturating_sub(1);
    let long_conf = ctx.confirm_long(last, conf_n);
    let short_conf = ctx.confirm_short(last, conf_n);

    // (close_prev - ref) sign; None when the filter is off or the close is unusable
    let prev_close_vs_ref = cfg
        .use_prev_close_filter
        .then(|| {
            let reference = match cfg.prev_close_filter_ref {
                PrevCloseRef::Week => week,
                PrevCloseRef::Fast => fast,
            };
            prev.close - reference
        })
        .filter(|d| d.is_finite());
    let prev_close_long_ok = prev_close_vs_ref.map_or(true, |d| d >= 0.0);
    let prev_close_short_ok = prev_close_vs_ref.map_or(true, |d| d <= 0.0);

    let long_entry = long_stack
        && gates.enter_long
        && trend_long_ok
        && macd_long_ok
        && long_conf
        && prev_close_long_ok;
    let short_entry = short_stack
        && gates.enter_short
        && trend_short_ok
        && macd_short_ok
        && short_conf
        && cfg.enable_short
        && prev_close_short_ok;

    let can_exit = state.bars_held(t) >= cfg.min_hold_bars;

    match state.direction {
        Direction::Flat => {
            if long_entry {
                Direction::Long
            } else if short_entry {
                Direction::Short
            } else {
                Direction::Flat
            }
        }
        Direction::Long => {
            let exit = fast > week
                || gates.exit_long
                || (cfg.use_macd_exit && macd_bear)
                || prev_close_vs_ref.is_some_and(|d| d < 0.0);
            if can_exit && exit {
                Direction::Flat
            } else {
                Direction::Long
            }
        }
        Direction::Short => {
            let exit = week > fast
                || gates.exit_short
                || (cfg.use_macd_exit && macd_bull)
                || prev_close_vs_ref.is_some_and(|d| d > 0.0);
            if can_exit && exit {
                Direction::Flat
            } else {
                Direction::Short
            }
        }
    }
}
