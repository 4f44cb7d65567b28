//! Performance metrics: pure functions over a dated equity curve.
//!
//! CAGR uses calendar days between the first and last point, so results do
//! not depend on the trading calendar of the data set.

use serde::{Deserialize, Serialize};
use stacklab_core::domain::{EquityPoint, TradeEvent};

/// Summary statistics of one run (or one scoring window).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[EquityPoint], trades: &[TradeEvent]) -> Self {
        Self {
            final_equity: equity_curve.last().map_or(f64::NAN, |p| p.equity),
            total_return: total_return(equity_curve),
            cagr: cagr(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            trade_count: trades.len(),
        }
    }

    /// Drawdown-penalized CAGR.
    pub fn score(&self, dd_penalty: f64) -> f64 {
        score(self.cagr, self.max_drawdown, dd_penalty)
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Largest peak-to-trough loss as a positive fraction. NaN for an empty curve.
pub fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.is_empty() {
        return f64::NAN;
    }
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for p in equity_curve {
        peak = peak.max(p.equity);
        let dd = 1.0 - p.equity / peak.max(f64::MIN_POSITIVE);
        worst = worst.max(dd);
    }
    worst
}

/// Compound annual growth rate over calendar days.
///
/// NaN with fewer than two points or when no calendar time elapsed.
pub fn cagr(equity_curve: &[EquityPoint]) -> f64 {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return f64::NAN;
    };
    if equity_curve.len() < 2 {
        return f64::NAN;
    }
    let days = (last.date - first.date).num_days();
    if days <= 0 {
        return f64::NAN;
    }
    (last.equity / first.equity).powf(365.0 / days as f64) - 1.0
}

/// Last over first, minus one. NaN with fewer than two points.
pub fn total_return(equity_curve: &[EquityPoint]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(first), Some(last)) if equity_curve.len() >= 2 => last.equity / first.equity - 1.0,
        _ => f64::NAN,
    }
}

/// `cagr - dd_penalty * max_drawdown`; −∞ when either input is NaN so that
/// degenerate runs sort last.
pub fn score(cagr: f64, max_drawdown: f64, dd_penalty: f64) -> f64 {
    if cagr.is_nan() || max_drawdown.is_nan() {
        return f64::NEG_INFINITY;
    }
    cagr - dd_penalty * max_drawdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn curve(values: &[(i64, f64)]) -> Vec<EquityPoint> {
        let base = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        values
            .iter()
            .map(|&(day, equity)| EquityPoint {
                date: base + chrono::Duration::days(day),
                equity,
            })
            .collect()
    }

    #[test]
    fn drawdown_of_monotone_curve_is_zero() {
        let c = curve(&[(0, 1.0), (1, 1.1), (2, 1.2)]);
        assert_eq!(max_drawdown(&c), 0.0);
    }

    #[test]
    fn drawdown_takes_worst_trough() {
        let c = curve(&[(0, 1.0), (1, 2.0), (2, 1.5), (3, 2.5), (4, 1.0), (5, 3.0)]);
        // 1 - 1.0 / 2.5
        assert!((max_drawdown(&c) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn drawdown_empty_is_nan() {
        assert!(max_drawdown(&[]).is_nan());
    }

    #[test]
    fn cagr_over_one_calendar_year() {
        let c = curve(&[(0, 1.0), (100, 0.9), (365, 1.21)]);
        assert!((cagr(&c) - 0.21).abs() < 1e-12);
        let c = curve(&[(0, 1.0), (730, 1.21)]);
        assert!((cagr(&c) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn cagr_degenerate_cases() {
        assert!(cagr(&curve(&[(0, 1.0)])).is_nan());
        assert!(cagr(&curve(&[(3, 1.0), (3, 1.1)])).is_nan());
        assert!(cagr(&[]).is_nan());
    }

    #[test]
    fn total_return_basic() {
        let c = curve(&[(0, 2.0), (10, 3.0)]);
        assert!((total_return(&c) - 0.5).abs() < 1e-12);
        assert!(total_return(&curve(&[(0, 1.0)])).is_nan());
    }

    #[test]
    fn score_penalizes_drawdown_and_rejects_nan() {
        assert!((score(0.2, 0.1, 0.5) - 0.15).abs() < 1e-12);
        assert_eq!(score(f64::NAN, 0.1, 0.5), f64::NEG_INFINITY);
        assert_eq!(score(0.1, f64::NAN, 0.5), f64::NEG_INFINITY);
    }

    #[test]
    fn compute_collects_everything() {
        let c = curve(&[(0, 1.0), (365, 1.1)]);
        let m = PerformanceMetrics::compute(&c, &[]);
        assert_eq!(m.final_equity, 1.1);
        assert_eq!(m.trade_count, 0);
        assert!((m.cagr - 0.1).abs() < 1e-12);
        assert!((m.score(0.5) - 0.1).abs() < 1e-12);
    }
}
