//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2/(span+1).
//! Seeded with the first finite sample, no warm-up gap. A non-finite input
//! carries the previous value forward.

use super::{closes, Indicator};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    span: usize,
    name: String,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        assert!(span >= 1, "EMA span must be >= 1");
        Self {
            span,
            name: format!("ema_{span}"),
        }
    }

    /// EMA of an arbitrary series rather than the closes.
    pub fn over(&self, values: &[f64]) -> Vec<f64> {
        ema_of_series(values, self.span)
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        self.over(&closes(bars))
    }
}

fn ema_of_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span.max(1) as f64 + 1.0);
    let mut prev: Option<f64> = None;

    values
        .iter()
        .map(|&x| {
            if x.is_finite() {
                let next = match prev {
                    Some(p) => alpha * x + (1.0 - alpha) * p,
                    None => x,
                };
                prev = Some(next);
            }
            prev.unwrap_or(f64::NAN)
        })
        .collect()
}
