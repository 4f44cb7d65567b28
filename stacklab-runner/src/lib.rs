//! StackLab Runner: data loading, run orchestration, metrics, parameter search.
//!
//! This crate builds on `stacklab-core` to provide:
//! - CSV ingestion for single-symbol and panel files
//! - TOML run files
//! - Single-backtest runner with warm-up and window trimming
//! - Calendar-day performance metrics and a drawdown-penalized score
//! - Parallel random parameter search with deterministic sampling
//! - Artifact export (equity/trade CSVs, manifests, sweep results)

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, DataConfig, DataSource, RunConfig, Window};
pub use data_loader::{load_csv, load_panel_csv, load_source, LoadError};
pub use export::{save_run, save_sweep, RunManifest, SweepMeta};
pub use metrics::PerformanceMetrics;
pub use runner::{run_from_config, run_single, BacktestResult, RunError};
pub use sweep::{run_sweep, ParamSpace, SweepConfig, SweepEntry, SweepResults};
