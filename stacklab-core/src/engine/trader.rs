//! PositionStateMachine: per-bar exits, stops, entries and accounting.
//!
//! Per-bar order (encodes decision precedence):
//! 1. Extrema update for the open position
//! 2. Forced short cover after the maximum holding period
//! 3. Give-up rule (optional)
//! 4. Intrabar stop check against the bar's high/low
//! 5. Lagged context; no trading while it is unavailable
//! 6. Target decision, applied at the open
//! 7. Pyramid add (optional)
//! 8. Short borrow accrual
//! 9. Equity recording
//!
//! Steps 2-4 end the bar early: equity is recorded at the close and nothing
//! else happens.

use super::context::{IndicatorContext, PrevContext};
use super::cost_model::CostModel;
use super::decision::decide_target;
use super::state::{EngineState, RunResult};
use crate::config::{BacktestConfig, CostConfig, StrategyConfig, ValuationMode};
use crate::domain::{Direction, EquityPoint, TradeEvent, TradeReason, TradeSide};
use chrono::NaiveDate;
use tracing::debug;

/// Single-instrument trader. One instance per run, never shared.
pub struct PositionStateMachine<'a> {
    ctx: &'a IndicatorContext,
    strategy: &'a StrategyConfig,
    backtest: &'a BacktestConfig,
    cost_model: CostModel,
    enforce_short_max_hold: bool,
    short_max_hold_days: i64,
    borrow_daily: f64,
    max_units: u32,
    state: EngineState,
    trades: Vec<TradeEvent>,
    equity_curve: Vec<EquityPoint>,
}

impl<'a> PositionStateMachine<'a> {
    pub fn new(
        ctx: &'a IndicatorContext,
        strategy: &'a StrategyConfig,
        costs: &CostConfig,
        backtest: &'a BacktestConfig,
    ) -> Self {
        let cost_model = CostModel::new(costs);
        Self {
            ctx,
            strategy,
            backtest,
            borrow_daily: cost_model.daily_borrow_rate(),
            cost_model,
            enforce_short_max_hold: costs.enforce_short_max_hold,
            short_max_hold_days: costs.short_max_hold_days,
            max_units: strategy.effective_max_units(),
            state: EngineState::new(backtest.initial_capital),
            trades: Vec::new(),
            equity_curve: Vec::with_capacity(ctx.len()),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn trades(&self) -> &[TradeEvent] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Indices processed by `step`: 2 ..= n-2.
    pub fn processed_range(&self) -> std::ops::Range<usize> {
        2..self.ctx.len().saturating_sub(1)
    }

    /// Process bar `t`. Bars outside the processed range are ignored.
    pub fn step(&mut self, t: usize) {
        if !self.processed_range().contains(&t) {
            return;
        }
        let ctx = self.ctx;
        let bars = ctx.bars();
        let bar = &bars[t];
        let (open, high, low, close) = (bar.open, bar.high, bar.low, bar.close);

        // ─── Phase 1: Extrema ───
        // Give-up compares against the extreme through the previous bar.
        let prior_extreme = match self.state.position.direction {
            Direction::Long => Some(self.state.position.hist_max),
            Direction::Short => Some(self.state.position.hist_min),
            Direction::Flat => None,
        };
        self.state.position.update_extrema(open, close);

        // ─── Phase 2: Forced regulatory cover ───
        if self.should_force_cover(bar.date) {
            debug!(date = %bar.date, "short held past max-hold limit, forcing cover");
            self.exit_all(t, bar.date, open, TradeReason::ForcedCoverMaxHold);
            self.record_equity(bar.date, close);
            return;
        }

        // ─── Phase 3: Give-up ───
        if self.should_give_up(t, open, prior_extreme) {
            self.exit_all(t, bar.date, open, TradeReason::GiveUp);
            self.record_equity(bar.date, close);
            return;
        }

        // ─── Phase 4: Intrabar stop ───
        if let Some((reason, stop_px)) = self.check_stop(open, high, low) {
            self.exit_all(t, bar.date, stop_px, reason);
            // no borrow accrual for the rest of the bar
            self.record_equity(bar.date, close);
            return;
        }

        // ─── Phase 5: Lagged context ───
        let Some(prev) = ctx.context(t) else {
            self.record_equity(bar.date, close);
            return;
        };

        // ─── Phase 6: Decide and apply at the open ───
        let target = decide_target(t, &prev, ctx, &self.state.position, self.strategy);
        if target != self.state.position.direction {
            if !self.state.position.direction.is_flat() {
                self.exit_all(t, bar.date, open, TradeReason::SignalExit);
            }
            if !target.is_flat() {
                self.enter_new(t, bar.date, open, target, &prev);
            }
        }

        // ─── Phase 7: Pyramiding ───
        self.maybe_add_unit(bar.date, open);

        // ─── Phase 8: Short borrow ───
        if self.state.shares < 0 && close.is_finite() {
            self.state.cash -= self.state.shares.unsigned_abs() as f64 * close * self.borrow_daily;
        }

        // ─── Phase 9: Equity ───
        let mark = match self.backtest.valuation_mode {
            ValuationMode::Close => close,
            ValuationMode::NextOpen => bars[t + 1].open,
        };
        self.record_equity(bar.date, mark);

        debug_assert!(self.state.is_consistent(), "position state diverged from shares at bar {t}");
    }

    /// Process every bar in order and hand back the outputs.
    pub fn run(mut self) -> RunResult {
        for t in self.processed_range() {
            self.step(t);
        }
        self.into_result()
    }

    pub fn into_result(self) -> RunResult {
        RunResult {
            bar_count: self.equity_curve.len(),
            equity_curve: self.equity_curve,
            trades: self.trades,
            final_cash: self.state.cash,
            final_shares: self.state.shares,
        }
    }

    // ─── Rules ───────────────────────────────────────────────────────

    fn should_force_cover(&self, date: NaiveDate) -> bool {
        if !self.enforce_short_max_hold || self.state.position.direction != Direction::Short {
            return false;
        }
        self.state
            .position
            .entry_date
            .is_some_and(|entry| (date - entry).num_days() >= self.short_max_hold_days)
    }

    fn should_give_up(&self, t: usize, open: f64, prior_extreme: Option<f64>) -> bool {
        let cfg = self.strategy;
        if cfg.give_up_max_bars == 0 || !open.is_finite() || open <= 0.0 {
            return false;
        }
        let Some(extreme) = prior_extreme.filter(|x| x.is_finite() && *x > 0.0) else {
            return false;
        };
        if self.state.position.bars_held(t) > cfg.give_up_max_bars {
            return false;
        }
        let drawdown = match self.state.position.direction {
            Direction::Long => extreme / open - 1.0,
            Direction::Short => open / extreme - 1.0,
            Direction::Flat => return false,
        };
        drawdown >= cfg.give_up_drawdown_pct
    }

    /// Effective stop: max(daily, trailing) for longs, min(daily, trailing)
    /// for shorts. Returns the reason and fill price when breached.
    fn check_stop(&self, open: f64, high: f64, low: f64) -> Option<(TradeReason, f64)> {
        let pos = &self.state.position;
        if pos.units == 0 {
            return None;
        }
        let cfg = self.strategy;
        match pos.direction {
            Direction::Long => {
                let px = stop_price_long(open, pos.hist_max, cfg.long_daily_stop, cfg.long_trail_stop);
                (low <= px).then_some((TradeReason::StopLong, px))
            }
            Direction::Short => {
                let px =
                    stop_price_short(open, pos.hist_min, cfg.short_daily_stop, cfg.short_trail_stop);
                (high >= px).then_some((TradeReason::StopShort, px))
            }
            Direction::Flat => None,
        }
    }

    // ─── Execution ───────────────────────────────────────────────────

    /// Fraction of equity for a fresh entry.
    fn entry_fraction(&self, prev: &PrevContext) -> f64 {
        let base = 1.0 / self.max_units as f64;
        let cfg = self.strategy;
        if !cfg.use_macd_size_scaling {
            return base;
        }
        match (prev.macd, prev.atr) {
            (Some(m), Some(atr)) if atr > 0.0 && cfg.macd_size_atr_k > 0.0 => {
                base * macd_size_scale(
                    m.hist,
                    atr,
                    cfg.macd_size_min,
                    cfg.macd_size_max,
                    cfg.macd_size_atr_k,
                )
            }
            _ => base,
        }
    }

    fn enter_new(
        &mut self,
        t: usize,
        date: NaiveDate,
        price: f64,
        target: Direction,
        prev: &PrevContext,
    ) {
        let side = match target {
            Direction::Long => TradeSide::Buy,
            Direction::Short => TradeSide::Sell,
            Direction::Flat => return,
        };
        let Some(qty) = self.allocation_qty(price, self.entry_fraction(prev)) else {
            debug!(%date, price, "allocation below one share, staying flat");
            return;
        };
        self.state.position.open(target, price, date, t);
        self.execute(date, side, price, qty, TradeReason::SignalEntry);
    }

    fn maybe_add_unit(&mut self, date: NaiveDate, price: f64) {
        let pos = &self.state.position;
        if pos.direction.is_flat() || pos.units >= self.max_units {
            return;
        }
        let Some(entry) = pos.entry_price.filter(|p| *p > 0.0) else {
            return;
        };
        let episode_return = pos.direction.sign() as f64 * (price / entry - 1.0);
        if episode_return < self.strategy.pyramid_step_return {
            return;
        }
        let side = match pos.direction {
            Direction::Long => TradeSide::Buy,
            _ => TradeSide::Sell,
        };
        let Some(qty) = self.allocation_qty(price, 1.0 / self.max_units as f64) else {
            return;
        };
        self.state.position.units += 1;
        self.execute(date, side, price, qty, TradeReason::PyramidAdd);
    }

    /// Whole shares for `frac` of current equity at `price`; `None` below one.
    fn allocation_qty(&self, price: f64, frac: f64) -> Option<i64> {
        if !price.is_finite() || price <= 0.0 {
            return None;
        }
        let alloc = self.state.equity_value(price) * frac.clamp(0.0, 1.0);
        if alloc <= 0.0 {
            return None;
        }
        let qty = (alloc / price).floor() as i64;
        (qty > 0).then_some(qty)
    }

    /// Trade `qty` shares in the direction of `side` and log the event.
    fn execute(&mut self, date: NaiveDate, side: TradeSide, price: f64, qty: i64, reason: TradeReason) {
        let notional = qty as f64 * price;
        let (fee, tax) = self.cost_model.rates_for(side).apply(notional);
        let signed_qty = match side {
            TradeSide::Buy => {
                self.state.cash -= notional + fee + tax;
                qty
            }
            TradeSide::Sell => {
                self.state.cash += notional - fee - tax;
                -qty
            }
        };
        self.state.shares += signed_qty;
        self.log_trade(date, side, price, reason, signed_qty, notional, fee, tax);
    }

    /// Close the whole position at `price` and reset the position record.
    fn exit_all(&mut self, t: usize, date: NaiveDate, price: f64, reason: TradeReason) {
        if self.state.position.direction.is_flat() {
            return;
        }
        if self.state.shares != 0 {
            let side = if self.state.shares > 0 {
                TradeSide::Sell
            } else {
                TradeSide::Buy
            };
            let qty = self.state.shares.abs();
            self.state.position.direction = Direction::Flat;
            self.state.position.units = 0;
            self.execute(date, side, price, qty, reason);
        }
        self.state
            .position
            .reset(t + self.strategy.cooldown_bars);
    }

    #[allow(clippy::too_many_arguments)]
    fn log_trade(
        &mut self,
        date: NaiveDate,
        side: TradeSide,
        price: f64,
        reason: TradeReason,
        qty: i64,
        notional: f64,
        fee: f64,
        tax: f64,
    ) {
        let position_after = Direction::from_shares(self.state.shares).sign();
        let equity_after = self.normalized_equity(price);
        debug!(
            %date,
            side = side.as_str(),
            reason = reason.as_str(),
            price,
            qty,
            cash = self.state.cash,
            "trade executed"
        );
        self.trades.push(TradeEvent {
            date,
            symbol: self.backtest.symbol.clone(),
            side,
            reason,
            price,
            position_after,
            units_after: self.state.position.units,
            fee_paid: fee,
            tax_paid: tax,
            qty,
            notional,
            cash_after: self.state.cash,
            equity_after,
        });
    }

    // ─── Equity ──────────────────────────────────────────────────────

    fn normalized_equity(&self, price: f64) -> f64 {
        let base = if self.backtest.initial_capital > 0.0 {
            self.backtest.initial_capital
        } else {
            1.0
        };
        self.backtest.initial_equity * self.state.equity_value(price) / base
    }

    fn record_equity(&mut self, date: NaiveDate, price: f64) {
        let equity = self.normalized_equity(price);
        self.equity_curve.push(EquityPoint { date, equity });
    }
}

/// Long stop: the tighter (higher) of the daily and trailing levels.
pub fn stop_price_long(open: f64, hist_max: f64, daily: f64, trail: f64) -> f64 {
    (open * (1.0 - daily)).max(hist_max * (1.0 - trail))
}

/// Short stop: the tighter (lower) of the daily and trailing levels.
pub fn stop_price_short(open: f64, hist_min: f64, daily: f64, trail: f64) -> f64 {
    (open * (1.0 + daily)).min(hist_min * (1.0 + trail))
}

/// Size multiplier from MACD histogram strength relative to ATR.
///
/// Linear from `min` at zero histogram to `max` at `|hist| = atr_k * atr`,
/// clamped to `[min, max]`. Inverted bounds are swapped.
pub fn macd_size_scale(hist: f64, atr: f64, min: f64, max: f64, atr_k: f64) -> f64 {
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    let strength = hist.abs() / (atr_k * atr);
    (lo + (hi - lo) * strength).clamp(lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_stop_takes_tighter_level() {
        // daily 95, trailing 108 * 0.9 = 97.2
        assert!((stop_price_long(100.0, 108.0, 0.05, 0.10) - 97.2).abs() < 1e-10);
        // daily dominates when the trail is far
        assert!((stop_price_long(100.0, 100.0, 0.05, 0.10) - 95.0).abs() < 1e-10);
    }

    #[test]
    fn short_stop_takes_tighter_level() {
        // daily 103, trailing 90 * 1.1 = 99
        assert!((stop_price_short(100.0, 90.0, 0.03, 0.10) - 99.0).abs() < 1e-10);
        assert!((stop_price_short(100.0, 100.0, 0.03, 0.10) - 103.0).abs() < 1e-10);
    }

    #[test]
    fn macd_scale_is_clamped() {
        assert!((macd_size_scale(0.0, 2.0, 0.6, 1.0, 1.0) - 0.6).abs() < 1e-12);
        assert!((macd_size_scale(1.0, 2.0, 0.6, 1.0, 1.0) - 0.8).abs() < 1e-12);
        assert!((macd_size_scale(-5.0, 2.0, 0.6, 1.0, 1.0) - 1.0).abs() < 1e-12);
        // inverted bounds
        assert!((macd_size_scale(0.0, 2.0, 1.0, 0.6, 1.0) - 0.6).abs() < 1e-12);
    }
}
