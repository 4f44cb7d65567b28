//! MACD: line, signal and histogram.
//!
//! Three bands (separate Indicator instances), each built from three EMAs:
//! - Line: EMA(close, fast) - EMA(close, slow)
//! - Signal: EMA(line, signal)
//! - Hist: line - signal

use super::ema::Ema;
use super::Indicator;
use crate::domain::Bar;

/// Which MACD series to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdBand {
    Line,
    Signal,
    Hist,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    band: MacdBand,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, band: MacdBand) -> Self {
        assert!(fast >= 1 && slow >= 1 && signal >= 1, "MACD spans must be >= 1");
        let tag = match band {
            MacdBand::Line => "line",
            MacdBand::Signal => "signal",
            MacdBand::Hist => "hist",
        };
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            band,
            name: format!("macd_{tag}_{fast}_{slow}_{signal}"),
        }
    }

    /// All three series at once: (line, signal, hist).
    pub fn compute_all(&self, bars: &[Bar]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let fast = self.fast.compute(bars);
        let slow = self.slow.compute(bars);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal = self.signal.over(&line);
        let hist = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
        (line, signal, hist)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let (line, signal, hist) = self.compute_all(bars);
        match self.band {
            MacdBand::Line => line,
            MacdBand::Signal => signal,
            MacdBand::Hist => hist,
        }
    }
}
