use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One point of the normalized equity curve. Exactly one per processed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Equity")]
    pub equity: f64,
}
