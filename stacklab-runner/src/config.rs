//! TOML run configuration.
//!
//! A run file carries the four engine records plus a `[data]` section that
//! says where the bars come from and which window is scored:
//!
//! ```toml
//! [backtest]
//! symbol = "005930.KS"
//! valuation_mode = "CLOSE"
//!
//! [data]
//! panel_csv = "kospi_panel.csv"
//! start = "2020-01-01"
//! end = "2024-12-31"
//!
//! [strategy]
//! confirm_days = 3
//! ```
//!
//! Every section is optional; missing fields take the engine defaults.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use stacklab_core::config::{
    BacktestConfig, CostConfig, EngineConfig, IndicatorConfig, StrategyConfig,
};
use thiserror::Error;

/// Errors from reading or validating a run file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("window start {start} is after end {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("no data source: set data.csv or data.panel_csv")]
    NoDataSource,

    #[error("data.csv and data.panel_csv are mutually exclusive")]
    AmbiguousDataSource,
}

/// Where bars are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Single-symbol OHLCV file.
    Csv(PathBuf),
    /// Multi-symbol file with a ticker column.
    Panel(PathBuf),
}

/// Inclusive scoring window. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Window {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Whole history.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => {
                Err(ConfigError::InvalidWindow { start, end })
            }
            _ => Ok(()),
        }
    }
}

/// `[data]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub csv: Option<PathBuf>,
    pub panel_csv: Option<PathBuf>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Calendar days of history loaded before `start`. When unset the runner
    /// derives it from the indicator windows.
    pub warmup_days: Option<i64>,
}

impl DataConfig {
    pub fn source(&self) -> Result<DataSource, ConfigError> {
        match (&self.csv, &self.panel_csv) {
            (Some(path), None) => Ok(DataSource::Csv(path.clone())),
            (None, Some(path)) => Ok(DataSource::Panel(path.clone())),
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousDataSource),
            (None, None) => Err(ConfigError::NoDataSource),
        }
    }

    pub fn window(&self) -> Window {
        Window::new(self.start, self.end)
    }
}

/// A complete run file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub backtest: BacktestConfig,
    pub data: DataConfig,
    pub indicators: IndicatorConfig,
    pub strategy: StrategyConfig,
    pub costs: CostConfig,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.data.window().validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// The engine's view of this run.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            indicators: self.indicators.clone(),
            strategy: self.strategy.clone(),
            costs: self.costs.clone(),
            backtest: self.backtest.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacklab_core::config::{PrevCloseRef, ValuationMode};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = RunConfig::from_toml("").unwrap();
        assert_eq!(cfg, RunConfig::default());
        assert_eq!(cfg.engine_config(), EngineConfig::default());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let cfg = RunConfig::from_toml(
            r#"
            [backtest]
            symbol = "AAPL"
            valuation_mode = "next_open"

            [data]
            csv = "aapl.csv"
            start = "2020-01-01"
            end = "2020-12-31"

            [strategy]
            confirm_days = 4
            prev_close_filter_ref = "WEEK"

            [costs]
            stt_rate = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.backtest.symbol, "AAPL");
        assert_eq!(cfg.backtest.valuation_mode, ValuationMode::NextOpen);
        assert_eq!(cfg.backtest.initial_capital, 1_000_000_000.0);
        assert_eq!(cfg.strategy.confirm_days, 4);
        assert_eq!(cfg.strategy.prev_close_filter_ref, PrevCloseRef::Week);
        assert_eq!(cfg.strategy.min_hold_bars, 3);
        assert_eq!(cfg.costs.stt_rate, 0.0);
        assert_eq!(cfg.indicators, IndicatorConfig::default());
        assert_eq!(
            cfg.data.source().unwrap(),
            DataSource::Csv(PathBuf::from("aapl.csv"))
        );
        assert_eq!(
            cfg.data.window(),
            Window::new(Some(date(2020, 1, 1)), Some(date(2020, 12, 31)))
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = RunConfig::from_toml(
            r#"
            [data]
            start = "2021-01-01"
            end = "2020-01-01"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWindow { .. }));
    }

    #[test]
    fn data_source_must_be_unique() {
        let mut data = DataConfig::default();
        assert!(matches!(data.source(), Err(ConfigError::NoDataSource)));
        data.csv = Some("a.csv".into());
        data.panel_csv = Some("b.csv".into());
        assert!(matches!(
            data.source(),
            Err(ConfigError::AmbiguousDataSource)
        ));
    }

    #[test]
    fn unknown_enum_value_fails_to_parse() {
        let err = RunConfig::from_toml(
            r#"
            [strategy]
            macd_signal_mode = "sideways"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let mut cfg = RunConfig::default();
        cfg.data.panel_csv = Some("panel.csv".into());
        cfg.data.start = Some(date(2015, 1, 1));
        cfg.strategy.cooldown_bars = 5;
        let text = cfg.to_toml().unwrap();
        assert_eq!(RunConfig::from_toml(&text).unwrap(), cfg);
    }

    #[test]
    fn window_contains_is_inclusive() {
        let w = Window::new(Some(date(2020, 1, 2)), Some(date(2020, 1, 4)));
        assert!(!w.contains(date(2020, 1, 1)));
        assert!(w.contains(date(2020, 1, 2)));
        assert!(w.contains(date(2020, 1, 4)));
        assert!(!w.contains(date(2020, 1, 5)));
        assert!(Window::unbounded().contains(date(1990, 1, 1)));
    }
}
