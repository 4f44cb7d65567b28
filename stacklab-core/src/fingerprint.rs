//! Run fingerprinting: deterministic identification of data and configuration.
//!
//! - `DatasetHash`: BLAKE3 over the canonical bar table (dates and raw f64 bits).
//! - `ConfigHash`: BLAKE3 over the canonical JSON of every configuration record.
//! - `RunFingerprint`: both hashes plus the window, recorded in run manifests.

use crate::config::EngineConfig;
use crate::domain::{Bar, ConfigHash, DatasetHash};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Hash a canonical bar table. Bit-exact: any change to any value changes the hash.
pub fn dataset_hash(bars: &[Bar]) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(bars.len() as u64).to_le_bytes());
    for bar in bars {
        hasher.update(&bar.date.num_days_from_ce().to_le_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(&v.to_bits().to_le_bytes());
        }
    }
    DatasetHash::from_hex(hasher.finalize().to_hex().to_string())
}

/// Hash every configuration record of a run.
///
/// serde_json emits struct fields in declaration order, so the JSON is canonical.
pub fn config_hash(config: &EngineConfig) -> Result<ConfigHash, serde_json::Error> {
    let json = serde_json::to_string(config)?;
    Ok(ConfigHash::from_bytes(json.as_bytes()))
}

/// Identity of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFingerprint {
    pub symbol: String,
    pub dataset_hash: DatasetHash,
    pub config_hash: ConfigHash,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl RunFingerprint {
    pub fn new(
        bars: &[Bar],
        config: &EngineConfig,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            symbol: config.backtest.symbol.clone(),
            dataset_hash: dataset_hash(bars),
            config_hash: config_hash(config)?,
            start_date,
            end_date,
        })
    }
}
