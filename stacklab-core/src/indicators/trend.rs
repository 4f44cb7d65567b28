//! Long-term trend sign.

/// sign(ma[i] - ma[i - lookback]) in {-1, 0, 1}.
///
/// Zero when `i < lookback` or either side is non-finite.
pub fn long_term_trend(ma: &[f64], lookback: usize) -> Vec<i8> {
    ma.iter()
        .enumerate()
        .map(|(i, &now)| {
            let Some(then) = i.checked_sub(lookback).map(|j| ma[j]) else {
                return 0;
            };
            if !now.is_finite() || !then.is_finite() {
                return 0;
            }
            let diff = now - then;
            if diff > 0.0 {
                1
            } else if diff < 0.0 {
                -1
            } else {
                0
            }
        })
        .collect()
}
