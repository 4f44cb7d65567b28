//! Canonical bar tables: sorted ascending, unique dates, finite OHLCV.

use crate::domain::Bar;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("no bars left after canonicalization")]
    Empty,

    #[error("non-finite {field} on {date}")]
    NonFinite { date: NaiveDate, field: &'static str },
}

/// Sort by date, keep the last bar of every duplicated date, and reject
/// non-finite values.
///
/// Duplicates resolve in input order: the bar that appeared later in the
/// input wins.
pub fn canonicalize(mut bars: Vec<Bar>) -> Result<Vec<Bar>, DataError> {
    if bars.is_empty() {
        return Err(DataError::Empty);
    }

    // stable sort keeps input order among equal dates
    bars.sort_by_key(|b| b.date);

    let before = bars.len();
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match out.last_mut() {
            Some(last) if last.date == bar.date => *last = bar,
            _ => out.push(bar),
        }
    }
    let dropped = before - out.len();
    if dropped > 0 {
        warn!(dropped, "duplicate dates collapsed (last wins)");
    }

    for bar in &out {
        check_finite(bar)?;
    }
    Ok(out)
}

fn check_finite(bar: &Bar) -> Result<(), DataError> {
    let fields = [
        ("Open", bar.open),
        ("High", bar.high),
        ("Low", bar.low),
        ("Close", bar.close),
        ("Volume", bar.volume),
    ];
    match fields.iter().find(|(_, v)| !v.is_finite()) {
        Some((field, _)) => Err(DataError::NonFinite {
            date: bar.date,
            field,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn sorts_and_keeps_last_duplicate() {
        let bars = vec![bar(3, 30.0), bar(1, 10.0), bar(3, 33.0), bar(2, 20.0)];
        let out = canonicalize(bars).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].close, 10.0);
        assert_eq!(out[1].close, 20.0);
        assert_eq!(out[2].close, 33.0);
        assert!(out.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(canonicalize(vec![]), Err(DataError::Empty));
    }

    #[test]
    fn rejects_non_finite() {
        let mut b = bar(2, 10.0);
        b.low = f64::NAN;
        let err = canonicalize(vec![bar(1, 10.0), b]).unwrap_err();
        assert!(matches!(err, DataError::NonFinite { field: "Low", .. }));
    }

    #[test]
    fn duplicate_with_nan_is_replaced_before_check() {
        let mut bad = bar(2, 10.0);
        bad.close = f64::NAN;
        let out = canonicalize(vec![bar(1, 9.0), bad, bar(2, 11.0)]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].close, 11.0);
    }
}
