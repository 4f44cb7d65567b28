//! Position direction and the single-owner position record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Net direction of the book. Derived from the sign of the share count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    Flat,
    Long,
    Short,
}

impl Direction {
    /// -1 / 0 / +1, the sign convention used by the trade ledger.
    pub fn sign(self) -> i32 {
        match self {
            Direction::Flat => 0,
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn from_shares(shares: i64) -> Self {
        match shares.signum() {
            1 => Direction::Long,
            -1 => Direction::Short,
            _ => Direction::Flat,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Direction::Flat
    }
}

/// Mutable position record, owned exclusively by one `PositionStateMachine`.
///
/// Reset to neutral on every flatten; only the cooldown expiry survives.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionState {
    pub direction: Direction,
    /// 0..=max_units
    pub units: u32,
    pub entry_price: Option<f64>,
    pub entry_date: Option<NaiveDate>,
    pub entry_index: Option<usize>,
    /// Highest open/close seen since entry (long trailing reference).
    pub hist_max: f64,
    /// Lowest open/close seen since entry (short trailing reference).
    pub hist_min: f64,
    /// Entries are blocked while flat and `bar index <= cooldown_until`.
    pub cooldown_until: Option<usize>,
}

impl Default for PositionState {
    fn default() -> Self {
        Self {
            direction: Direction::Flat,
            units: 0,
            entry_price: None,
            entry_date: None,
            entry_index: None,
            hist_max: f64::NEG_INFINITY,
            hist_min: f64::INFINITY,
            cooldown_until: None,
        }
    }
}

impl PositionState {
    /// Open a fresh episode. Extremes are seeded with the entry price.
    pub fn open(&mut self, direction: Direction, price: f64, date: NaiveDate, index: usize) {
        self.direction = direction;
        self.units = 1;
        self.entry_price = Some(price);
        self.entry_date = Some(date);
        self.entry_index = Some(index);
        self.hist_max = price;
        self.hist_min = price;
    }

    /// Back to neutral, arming the cooldown gate.
    pub fn reset(&mut self, cooldown_until: usize) {
        *self = Self {
            cooldown_until: Some(cooldown_until),
            ..Self::default()
        };
    }

    /// Extend the running extremes with a bar's open and close.
    pub fn update_extrema(&mut self, open: f64, close: f64) {
        match self.direction {
            Direction::Long => self.hist_max = self.hist_max.max(open.max(close)),
            Direction::Short => self.hist_min = self.hist_min.min(open.min(close)),
            Direction::Flat => {}
        }
    }

    /// Bars elapsed since entry, 0 while flat.
    pub fn bars_held(&self, index: usize) -> usize {
        self.entry_index
            .map(|e| index.saturating_sub(e))
            .unwrap_or(0)
    }

    pub fn in_cooldown(&self, index: usize) -> bool {
        self.direction.is_flat() && self.cooldown_until.is_some_and(|c| index <= c)
    }
}
