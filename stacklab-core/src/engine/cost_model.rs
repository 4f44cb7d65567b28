//! Cost model: transaction fees, sell-side tax and short borrow.
//!
//! Commission applies to every transaction. The transaction tax applies to
//! sells only (long exits and short entries). Borrow accrues per calendar day
//! while net shares are negative.

use crate::config::CostConfig;
use crate::domain::TradeSide;

/// Fee and tax rates for one transaction, as fractions of notional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRates {
    pub fee_rate: f64,
    pub tax_rate: f64,
}

impl CostRates {
    /// (fee, tax) in currency for a given notional.
    pub fn apply(&self, notional: f64) -> (f64, f64) {
        (self.fee_rate * notional, self.tax_rate * notional)
    }
}

/// Stateless beyond its configuration; safe to share across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    pub commission_rate: f64,
    pub stt_rate: f64,
    pub short_borrow_annual_rate: f64,
    pub short_borrow_day_count: i64,
}

impl CostModel {
    pub fn new(cfg: &CostConfig) -> Self {
        Self {
            commission_rate: cfg.commission_rate,
            stt_rate: cfg.stt_rate,
            short_borrow_annual_rate: cfg.short_borrow_annual_rate,
            short_borrow_day_count: cfg.short_borrow_day_count,
        }
    }

    pub fn rates_for(&self, side: TradeSide) -> CostRates {
        let tax_rate = match side {
            TradeSide::Sell => self.stt_rate,
            TradeSide::Buy => 0.0,
        };
        CostRates {
            fee_rate: self.commission_rate,
            tax_rate,
        }
    }

    /// Annual borrow rate over the day-count divisor. A non-positive divisor
    /// falls back to 365.
    pub fn daily_borrow_rate(&self) -> f64 {
        let day_count = if self.short_borrow_day_count > 0 {
            self.short_borrow_day_count as f64
        } else {
            365.0
        };
        self.short_borrow_annual_rate / day_count
    }
}
