//! Mutable engine state and run result types.

use crate::domain::{Direction, EquityPoint, PositionState, TradeEvent};

/// Cash, signed shares and the position record. Owned by exactly one
/// `PositionStateMachine`.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub cash: f64,
    /// Positive long, negative short.
    pub shares: i64,
    pub position: PositionState,
}

impl EngineState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            shares: 0,
            position: PositionState::default(),
        }
    }

    /// Account value in currency at `price`.
    pub fn equity_value(&self, price: f64) -> f64 {
        self.cash + self.shares as f64 * price
    }

    /// flat <=> units == 0 <=> shares == 0
    pub fn is_consistent(&self) -> bool {
        let flat = self.position.direction == Direction::Flat;
        flat == (self.position.units == 0)
            && flat == (self.shares == 0)
            && (flat || Direction::from_shares(self.shares) == self.position.direction)
    }
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// One point per processed bar.
    pub equity_curve: Vec<EquityPoint>,
    /// One event per executed transaction.
    pub trades: Vec<TradeEvent>,
    pub final_cash: f64,
    pub final_shares: i64,
    /// Number of bars that produced an equity point.
    pub bar_count: usize,
}

impl RunResult {
    /// Last normalized equity, or `None` when nothing was processed.
    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}
