//! TradeEvent: one executed transaction in the ledger.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a transaction happened. The serialized codes are part of the
/// exported ledger format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeReason {
    SignalEntry,
    SignalExit,
    #[serde(rename = "STOP:LONG")]
    StopLong,
    #[serde(rename = "STOP:SHORT")]
    StopShort,
    #[serde(rename = "FORCED_COVER_MAXHOLD")]
    ForcedCoverMaxHold,
    PyramidAdd,
    #[serde(rename = "GIVE_UP")]
    GiveUp,
}

impl TradeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeReason::SignalEntry => "SignalEntry",
            TradeReason::SignalExit => "SignalExit",
            TradeReason::StopLong => "STOP:LONG",
            TradeReason::StopShort => "STOP:SHORT",
            TradeReason::ForcedCoverMaxHold => "FORCED_COVER_MAXHOLD",
            TradeReason::PyramidAdd => "PyramidAdd",
            TradeReason::GiveUp => "GIVE_UP",
        }
    }

    pub fn is_stop(self) -> bool {
        matches!(self, TradeReason::StopLong | TradeReason::StopShort)
    }
}

impl fmt::Display for TradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only ledger record. `cash_after` and `equity_after` are the
/// engine's running totals at the moment of the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    #[serde(rename = "timestamp")]
    pub date: NaiveDate,
    pub symbol: String,
    pub side: TradeSide,
    pub reason: TradeReason,
    pub price: f64,
    /// -1 / 0 / +1 after the trade.
    pub position_after: i32,
    pub units_after: u32,
    pub fee_paid: f64,
    pub tax_paid: f64,
    /// Signed share quantity: positive buys, negative sells.
    pub qty: i64,
    pub notional: f64,
    pub cash_after: f64,
    /// Normalized equity marked at the trade price.
    pub equity_after: f64,
}

impl TradeEvent {
    pub fn total_cost(&self) -> f64 {
        self.fee_paid + self.tax_paid
    }
}
