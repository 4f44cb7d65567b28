//! Simple Moving Average (SMA) with a partial leading window.
//!
//! SMA[i] = mean of the finite closes among the last `min(i+1, period)` bars.
//! Valid from the first bar; NaN only when the window holds no finite value.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rolling_mean(&closes, self.period)
    }
}

/// Bars between exact recomputations of the running window sum, which
/// otherwise accumulates rounding error from the add/subtract updates.
const RESYNC_EVERY: usize = 1024;

/// Trailing mean over `window` samples, skipping non-finite values.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut result = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    let mut count = 0usize;

    for i in 0..values.len() {
        let entering = values[i];
        if entering.is_finite() {
            sum += entering;
            count += 1;
        }
        if i >= window {
            let leaving = values[i - window];
            if leaving.is_finite() {
                sum -= leaving;
                count -= 1;
            }
        }
        if (i + 1) % RESYNC_EVERY == 0 {
            let window_values = values[(i + 1).saturating_sub(window)..=i]
                .iter()
                .filter(|v| v.is_finite());
            sum = window_values.clone().sum::<f64>();
            count = window_values.count();
        }
        result.push(if count > 0 { sum / count as f64 } else { f64::NAN });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn sma_partial_window_from_first_bar() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = Sma::new(5).compute(&bars);

        assert_eq!(result.len(), 7);
        assert_approx(result[0], 10.0, DEFAULT_EPSILON);
        assert_approx(result[1], 10.5, DEFAULT_EPSILON);
        assert_approx(result[3], 11.5, DEFAULT_EPSILON);
        // full window from index 4
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[5], 13.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_1_is_close() {
        let bars = make_bars(&[100.0, 200.0, 300.0]);
        let result = Sma::new(1).compute(&bars);
        assert_approx(result[0], 100.0, DEFAULT_EPSILON);
        assert_approx(result[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_omits_nan_in_window() {
        let result = rolling_mean(&[10.0, f64::NAN, 12.0, 13.0], 3);
        assert_approx(result[1], 10.0, DEFAULT_EPSILON);
        // [10, NaN, 12] -> mean(10, 12)
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        // [NaN, 12, 13]
        assert_approx(result[3], 12.5, DEFAULT_EPSILON);
    }

    #[test]
    fn running_sum_is_resynced_after_large_values_leave() {
        // 1e15 has an ulp of 0.125, so cancelling it leaves a stale residue
        let values: Vec<f64> = (0..2000)
            .map(|i| if i < 3 { 1e15 } else { 0.1 * (i % 10) as f64 })
            .collect();
        let result = rolling_mean(&values, 3);

        let exact = |i: usize| values[i - 2..=i].iter().sum::<f64>() / 3.0;
        assert_eq!(result[RESYNC_EVERY - 1], exact(RESYNC_EVERY - 1));
        assert_approx(result[1999], exact(1999), 1e-9);
    }

    #[test]
    fn sma_all_nan_window_is_nan() {
        let result = rolling_mean(&[f64::NAN, f64::NAN, 5.0], 2);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 5.0, DEFAULT_EPSILON);
    }
}
