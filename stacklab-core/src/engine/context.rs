//! Indicator context: per-bar snapshots and the lagged decision view.
//!
//! All indicators are computed once before the bar loop begins. The bar loop
//! never reads a snapshot directly: it asks for `context(i)`, which is built
//! strictly from bar `i - 1`. That is the causality boundary of the engine.

use crate::config::IndicatorConfig;
use crate::domain::Bar;
use crate::indicators::{long_term_trend, Atr, Indicator, Macd, MacdBand, Sma};
use chrono::NaiveDate;

/// Derived values for one bar. Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub sma_week: f64,
    pub sma_fast: f64,
    pub sma_slow: f64,
    pub sma_long_term: f64,
    pub atr: f64,
    /// Sign of the long-term MA against its lagged value.
    pub trend: i8,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
}

impl IndicatorSnapshot {
    fn stack_is_finite(&self) -> bool {
        self.sma_week.is_finite() && self.sma_fast.is_finite() && self.sma_slow.is_finite()
    }

    /// week > fast > slow
    pub fn long_stack(&self) -> bool {
        self.stack_is_finite() && self.sma_week > self.sma_fast && self.sma_fast > self.sma_slow
    }

    /// slow > fast > week
    pub fn short_stack(&self) -> bool {
        self.stack_is_finite() && self.sma_slow > self.sma_fast && self.sma_fast > self.sma_week
    }
}

/// MACD values of the previous bar, present only when all three are finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPrev {
    pub line: f64,
    pub signal: f64,
    pub hist: f64,
}

/// What the decision step for bar `i` may see: values from bar `i - 1`.
///
/// Only produced when the three primary moving averages at `i - 1` are
/// finite, so the stack fields never carry NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrevContext {
    /// Date of the bar being decided (bar `i`).
    pub date: NaiveDate,
    pub close: f64,
    pub sma_week: f64,
    pub sma_fast: f64,
    pub sma_slow: f64,
    /// `None` unless finite.
    pub atr: Option<f64>,
    pub trend: i8,
    pub macd: Option<MacdPrev>,
}

/// Bars plus their precomputed snapshots. Read-only after `build`, so a single
/// context can be shared by every run of a parameter sweep.
#[derive(Debug, Clone)]
pub struct IndicatorContext {
    bars: Vec<Bar>,
    snapshots: Vec<IndicatorSnapshot>,
    config: IndicatorConfig,
}

impl IndicatorContext {
    /// Compute every indicator series over `bars` (sorted, de-duplicated).
    pub fn build(bars: &[Bar], config: &IndicatorConfig) -> Self {
        let sma = |period: usize| Sma::new(period.max(1));
        let indicators: [Box<dyn Indicator>; 8] = [
            Box::new(sma(config.sma_week)),
            Box::new(sma(config.sma_fast)),
            Box::new(sma(config.sma_slow)),
            Box::new(sma(config.sma_long_term)),
            Box::new(Atr::new(config.atr_window.max(1))),
            Box::new(macd(config, MacdBand::Line)),
            Box::new(macd(config, MacdBand::Signal)),
            Box::new(macd(config, MacdBand::Hist)),
        ];

        let series: Vec<Vec<f64>> = indicators
            .iter()
            .map(|ind| {
                let s = ind.compute(bars);
                debug_assert_eq!(
                    s.len(),
                    bars.len(),
                    "indicator '{}' produced {} values for {} bars",
                    ind.name(),
                    s.len(),
                    bars.len()
                );
                s
            })
            .collect();

        let [week, fast, slow, long_term, atr, line, signal, hist] = &series[..] else {
            unreachable!("eight indicator series");
        };
        let trend = long_term_trend(long_term, config.long_trend_lookback);

        let snapshots = (0..bars.len())
            .map(|i| IndicatorSnapshot {
                close: bars[i].close,
                sma_week: week[i],
                sma_fast: fast[i],
                sma_slow: slow[i],
                sma_long_term: long_term[i],
                atr: atr[i],
                trend: trend[i],
                macd_line: line[i],
                macd_signal: signal[i],
                macd_hist: hist[i],
            })
            .collect();

        Self {
            bars: bars.to_vec(),
            snapshots,
            config: config.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn snapshots(&self) -> &[IndicatorSnapshot] {
        &self.snapshots
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Lagged context for deciding bar `i`.
    ///
    /// `None` for `i < 2`, past the end, or while any of the week/fast/slow
    /// averages at `i - 1` is non-finite.
    pub fn context(&self, i: usize) -> Option<PrevContext> {
        if i < 2 || i >= self.len() {
            return None;
        }
        let prev = &self.snapshots[i - 1];
        if !prev.stack_is_finite() {
            return None;
        }
        let macd = (prev.macd_line.is_finite()
            && prev.macd_signal.is_finite()
            && prev.macd_hist.is_finite())
        .then_some(MacdPrev {
            line: prev.macd_line,
            signal: prev.macd_signal,
            hist: prev.macd_hist,
        });

        Some(PrevContext {
            date: self.bars[i].date,
            close: prev.close,
            sma_week: prev.sma_week,
            sma_fast: prev.sma_fast,
            sma_slow: prev.sma_slow,
            atr: prev.atr.is_finite().then_some(prev.atr),
            trend: prev.trend,
            macd,
        })
    }

    /// True when the long stack held on every bar of `last - n + 1 ..= last`.
    ///
    /// False if the window starts before bar 0.
    pub fn confirm_long(&self, last: usize, n: usize) -> bool {
        self.window(last, n)
            .is_some_and(|w| w.iter().all(IndicatorSnapshot::long_stack))
    }

    /// Short-stack counterpart of [`confirm_long`](Self::confirm_long).
    pub fn confirm_short(&self, last: usize, n: usize) -> bool {
        self.window(last, n)
            .is_some_and(|w| w.iter().all(IndicatorSnapshot::short_stack))
    }

    fn window(&self, last: usize, n: usize) -> Option<&[IndicatorSnapshot]> {
        let n = n.max(1);
        let start = (last + 1).checked_sub(n)?;
        self.snapshots.get(start..=last)
    }
}

fn macd(config: &IndicatorConfig, band: MacdBand) -> Macd {
    Macd::new(
        config.macd_fast.max(1),
        config.macd_slow.max(1),
        config.macd_signal.max(1),
        band,
    )
}
