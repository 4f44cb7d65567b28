//! Artifact export: equity/trade CSVs, run manifests, sweep results.
//!
//! File layout of a run directory:
//! - `equity_<SYMBOL>.csv`: `Date,Equity`
//! - `trades_<SYMBOL>.csv`: one row per ledger event
//! - `manifest.json`: fingerprint, configs, window, metrics
//!
//! and of a sweep directory:
//! - `opt_results.csv`: every evaluation, best first
//! - `best_params.json`: the winning strategy record
//! - `meta.json`: search settings and data provenance
//!
//! Dots in the symbol become underscores in file names.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stacklab_core::config::{CostConfig, EngineConfig, IndicatorConfig, StrategyConfig};
use stacklab_core::domain::{EquityPoint, TradeEvent};
use stacklab_core::fingerprint::RunFingerprint;
use tracing::info;

use crate::config::Window;
use crate::metrics::PerformanceMetrics;
use crate::runner::BacktestResult;
use crate::sweep::{SweepConfig, SweepResults};

/// Current schema version for persisted manifests.
pub const SCHEMA_VERSION: u32 = 1;

const TRADE_COLUMNS: [&str; 13] = [
    "timestamp",
    "symbol",
    "side",
    "reason",
    "price",
    "position_after",
    "units_after",
    "fee_paid",
    "tax_paid",
    "qty",
    "notional",
    "cash_after",
    "equity_after",
];

/// `"005930.KS"` → `"005930_KS"`.
pub fn file_symbol(symbol: &str) -> String {
    symbol.replace('.', "_")
}

fn headerless_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(vec![])
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

// ─── CSV export ─────────────────────────────────────────────────────

/// `Date,Equity`, one row per point.
pub fn equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = headerless_writer();
    wtr.write_record(["Date", "Equity"])?;
    for point in equity_curve {
        wtr.serialize(point)?;
    }
    finish(wtr)
}

/// Ledger rows in execution order. The header is written even when empty.
pub fn trades_csv(trades: &[TradeEvent]) -> Result<String> {
    let mut wtr = headerless_writer();
    wtr.write_record(TRADE_COLUMNS)?;
    for trade in trades {
        wtr.serialize(trade)?;
    }
    finish(wtr)
}

// ─── Run artifacts ──────────────────────────────────────────────────

/// Persisted summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    pub fingerprint: RunFingerprint,
    pub config: EngineConfig,
    pub window: Window,
    pub metrics: PerformanceMetrics,
    pub bar_count: usize,
    pub warmup_bars: usize,
    pub equity_points: usize,
}

impl RunManifest {
    pub fn from_result(result: &BacktestResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            fingerprint: result.fingerprint.clone(),
            config: result.config.clone(),
            window: result.window,
            metrics: result.metrics,
            bar_count: result.bar_count,
            warmup_bars: result.warmup_bars,
            equity_points: result.equity_curve.len(),
        }
    }
}

/// Paths written by [`save_run`].
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub dir: PathBuf,
    pub equity: PathBuf,
    pub trades: PathBuf,
    pub manifest: PathBuf,
}

/// Write the equity curve, trade ledger and manifest of one run into `dir`.
pub fn save_run(result: &BacktestResult, dir: &Path) -> Result<RunArtifacts> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;

    let stem = file_symbol(&result.config.backtest.symbol);
    let equity = dir.join(format!("equity_{stem}.csv"));
    let trades = dir.join(format!("trades_{stem}.csv"));
    let manifest = dir.join("manifest.json");

    write_file(&equity, &equity_csv(&result.equity_curve)?)?;
    write_file(&trades, &trades_csv(&result.trades)?)?;
    let json = serde_json::to_string_pretty(&RunManifest::from_result(result))
        .context("failed to serialize run manifest")?;
    write_file(&manifest, &json)?;

    info!(dir = %dir.display(), "run artifacts written");
    Ok(RunArtifacts {
        dir: dir.to_path_buf(),
        equity,
        trades,
        manifest,
    })
}

/// Read a manifest written by [`save_run`], rejecting newer schema versions.
pub fn load_manifest(path: &Path) -> Result<RunManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: RunManifest =
        serde_json::from_str(&json).context("failed to parse run manifest")?;
    anyhow::ensure!(
        manifest.schema_version <= SCHEMA_VERSION,
        "unsupported schema version {} (max supported: {})",
        manifest.schema_version,
        SCHEMA_VERSION
    );
    Ok(manifest)
}

// ─── Sweep artifacts ────────────────────────────────────────────────

/// Provenance of a parameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepMeta {
    pub symbol: String,
    pub train_start: Option<NaiveDate>,
    pub train_end: Option<NaiveDate>,
    pub fetch_start: Option<NaiveDate>,
    pub sweep: SweepConfig,
    pub data_source: String,
    pub dataset_hash: String,
    pub indicators: IndicatorConfig,
    pub costs: CostConfig,
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One row per evaluation: the strategy fields (sorted by name), then
/// `score,cagr,max_dd,final_equity,trade_count`.
pub fn opt_results_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = headerless_writer();
    let mut header_written = false;

    for entry in results.all() {
        let Value::Object(fields) =
            serde_json::to_value(&entry.strategy).context("failed to serialize strategy")?
        else {
            anyhow::bail!("strategy did not serialize to an object");
        };

        if !header_written {
            let mut header: Vec<String> = fields.keys().cloned().collect();
            header.extend(
                ["score", "cagr", "max_dd", "final_equity", "trade_count"].map(String::from),
            );
            wtr.write_record(&header)?;
            header_written = true;
        }

        let mut row: Vec<String> = fields.values().map(cell).collect();
        row.push(entry.score.to_string());
        row.push(entry.metrics.cagr.to_string());
        row.push(entry.metrics.max_drawdown.to_string());
        row.push(entry.metrics.final_equity.to_string());
        row.push(entry.metrics.trade_count.to_string());
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Paths written by [`save_sweep`].
#[derive(Debug, Clone)]
pub struct SweepArtifacts {
    pub results: PathBuf,
    pub best_params: Option<PathBuf>,
    pub meta: PathBuf,
}

/// Write `opt_results.csv`, `best_params.json` (when any evaluation ran)
/// and `meta.json` into `dir`.
pub fn save_sweep(results: &SweepResults, meta: &SweepMeta, dir: &Path) -> Result<SweepArtifacts> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;

    let meta_path = dir.join("meta.json");
    let json = serde_json::to_string_pretty(meta).context("failed to serialize sweep meta")?;
    write_file(&meta_path, &json)?;

    let results_path = dir.join("opt_results.csv");
    write_file(&results_path, &opt_results_csv(results)?)?;

    let best_params = match results.best() {
        Some(best) => {
            let path = dir.join("best_params.json");
            let json = serde_json::to_string_pretty(&best.strategy)
                .context("failed to serialize best params")?;
            write_file(&path, &json)?;
            Some(path)
        }
        None => None,
    };

    info!(dir = %dir.display(), evals = results.len(), "sweep artifacts written");
    Ok(SweepArtifacts {
        results: results_path,
        best_params,
        meta: meta_path,
    })
}

// ─── Parameter files ────────────────────────────────────────────────

/// Read a strategy parameter file.
///
/// Accepts either a saved `best_params.json` (snake_case field names) or an
/// external optimizer mapping with PascalCase keys such as
/// `{"SpreadEnterPct": 0.003}`. Missing fields keep their defaults.
pub fn load_params_json(path: &Path) -> Result<StrategyConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_params_json(&text).with_context(|| format!("invalid parameter file {}", path.display()))
}

pub fn parse_params_json(text: &str) -> Result<StrategyConfig> {
    let value: Value = serde_json::from_str(text).context("parameter file is not valid JSON")?;
    let Value::Object(map) = value else {
        anyhow::bail!("parameter file must contain a JSON object");
    };
    let pascal = map
        .keys()
        .any(|k| k.chars().next().is_some_and(|c| c.is_ascii_uppercase()));
    if pascal {
        Ok(StrategyConfig::from_params_map(&map)?)
    } else {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacklab_core::domain::{TradeReason, TradeSide};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn symbol_dots_become_underscores() {
        assert_eq!(file_symbol("005930.KS"), "005930_KS");
        assert_eq!(file_symbol("AAPL"), "AAPL");
    }

    #[test]
    fn equity_csv_layout() {
        let curve = vec![
            EquityPoint {
                date: date(2020, 1, 2),
                equity: 1.0,
            },
            EquityPoint {
                date: date(2020, 1, 3),
                equity: 1.25,
            },
        ];
        let csv = equity_csv(&curve).unwrap();
        assert_eq!(csv, "Date,Equity\n2020-01-02,1.0\n2020-01-03,1.25\n");
    }

    #[test]
    fn trades_csv_header_and_codes() {
        let empty = trades_csv(&[]).unwrap();
        assert_eq!(empty.trim_end(), TRADE_COLUMNS.join(","));

        let trade = TradeEvent {
            date: date(2020, 1, 2),
            symbol: "005930.KS".into(),
            side: TradeSide::Sell,
            reason: TradeReason::StopLong,
            price: 100.0,
            position_after: 0,
            units_after: 0,
            fee_paid: 0.0,
            tax_paid: 1.8,
            qty: -10,
            notional: 1000.0,
            cash_after: 2000.0,
            equity_after: 1.1,
        };
        let csv = trades_csv(&[trade]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "2020-01-02,005930.KS,SELL,STOP:LONG,100.0,0,0,0.0,1.8,-10,1000.0,2000.0,1.1"
        );
    }

    #[test]
    fn params_json_accepts_both_key_styles() {
        let snake = parse_params_json(r#"{"confirm_days": 4, "macd_signal_mode": "hist"}"#).unwrap();
        assert_eq!(snake.confirm_days, 4);
        assert_eq!(snake.macd_signal_mode.as_str(), "hist");

        let saved = serde_json::to_string(&StrategyConfig {
            cooldown_bars: 7,
            ..StrategyConfig::default()
        })
        .unwrap();
        assert_eq!(parse_params_json(&saved).unwrap().cooldown_bars, 7);

        let pascal =
            parse_params_json(r#"{"ConfirmDays": 3, "UseATRFilter": 0, "Unknown": "x"}"#).unwrap();
        assert_eq!(pascal.confirm_days, 3);
        assert!(!pascal.use_atr_filter);
        assert!(parse_params_json(r#"{"ConfirmDays": "three"}"#).is_err());

        assert!(parse_params_json("[1, 2]").is_err());
        assert!(parse_params_json("not json").is_err());
    }
}
