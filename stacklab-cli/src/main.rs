//! StackLab CLI: run, optimize and validate commands.
//!
//! Commands:
//! - `run`: one backtest from a TOML run file or a CSV, with optional
//!   parameter/cost overrides
//! - `optimize`: random parameter search scored on a training window
//! - `validate`: replay saved parameters on a validation window

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use stacklab_core::config::{CostConfig, EngineConfig, StrategyConfig, ValuationMode};
use stacklab_core::engine::IndicatorContext;
use stacklab_core::fingerprint::dataset_hash;
use stacklab_runner::config::{DataSource, RunConfig, Window};
use stacklab_runner::data_loader::load_source;
use stacklab_runner::export::{load_params_json, save_run, save_sweep, SweepMeta};
use stacklab_runner::runner::{fetch_range, run_single, BacktestResult, DEFAULT_WARMUP_DAYS};
use stacklab_runner::sweep::{run_sweep, ParamSpace, SweepConfig};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "stacklab",
    about = "StackLab CLI: moving-average stack backtester"
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct DataArgs {
    /// Single-symbol OHLCV CSV.
    #[arg(long, conflicts_with = "panel_csv")]
    csv: Option<PathBuf>,

    /// Panel CSV with Date and Ticker columns.
    #[arg(long)]
    panel_csv: Option<PathBuf>,
}

impl DataArgs {
    fn source(&self) -> Option<DataSource> {
        match (&self.csv, &self.panel_csv) {
            (Some(p), _) => Some(DataSource::Csv(p.clone())),
            (None, Some(p)) => Some(DataSource::Panel(p.clone())),
            (None, None) => None,
        }
    }

    fn describe(&self) -> &'static str {
        if self.panel_csv.is_some() {
            "panel_csv"
        } else {
            "csv"
        }
    }
}

#[derive(Args, Clone)]
struct CostArgs {
    /// Sell-side transaction tax rate.
    #[arg(long)]
    stt_rate: Option<f64>,

    #[arg(long)]
    commission_rate: Option<f64>,

    #[arg(long)]
    short_borrow_annual_rate: Option<f64>,

    #[arg(long)]
    short_borrow_day_count: Option<i64>,
}

impl CostArgs {
    fn apply(&self, costs: &mut CostConfig) {
        if let Some(v) = self.stt_rate {
            costs.stt_rate = v;
        }
        if let Some(v) = self.commission_rate {
            costs.commission_rate = v;
        }
        if let Some(v) = self.short_borrow_annual_rate {
            costs.short_borrow_annual_rate = v;
        }
        if let Some(v) = self.short_borrow_day_count {
            costs.short_borrow_day_count = v;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one backtest.
    Run {
        /// TOML run file. Other flags override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        data: DataArgs,

        /// Symbol (defaults to the run file's, then 005930.KS).
        #[arg(long)]
        symbol: Option<String>,

        /// Window start (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Window end (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Calendar days of history to load before --start.
        #[arg(long)]
        warmup_days: Option<i64>,

        /// Strategy parameter JSON (snake_case or PascalCase keys).
        #[arg(long)]
        params_json: Option<PathBuf>,

        /// CLOSE or NEXT_OPEN.
        #[arg(long)]
        valuation_mode: Option<ValuationMode>,

        #[command(flatten)]
        costs: CostArgs,

        /// Output directory for artifacts.
        #[arg(long, default_value = "outputs")]
        out: PathBuf,
    },
    /// Random parameter search on a training window.
    Optimize {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, default_value = "005930.KS")]
        symbol: String,

        #[arg(long, default_value = "2020-01-01")]
        train_start: NaiveDate,

        #[arg(long, default_value = "2024-12-31")]
        train_end: NaiveDate,

        #[arg(long, default_value_t = DEFAULT_WARMUP_DAYS)]
        warmup_days: i64,

        #[arg(long, default_value_t = 800)]
        n_evals: usize,

        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Score = CAGR - dd_penalty * max drawdown.
        #[arg(long, default_value_t = 0.5)]
        dd_penalty: f64,

        #[command(flatten)]
        costs: CostArgs,

        #[arg(long, default_value = "outputs_opt")]
        out: PathBuf,
    },
    /// Replay saved parameters on a validation window.
    Validate {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, default_value = "005930.KS")]
        symbol: String,

        /// Parameter file written by `optimize`.
        #[arg(long, default_value = "outputs_opt/best_params.json")]
        params: PathBuf,

        #[arg(long, default_value = "2015-01-01")]
        valid_start: NaiveDate,

        #[arg(long, default_value = "2019-12-31")]
        valid_end: NaiveDate,

        #[arg(long, default_value_t = DEFAULT_WARMUP_DAYS)]
        warmup_days: i64,

        #[command(flatten)]
        costs: CostArgs,

        #[arg(long, default_value = "outputs_valid")]
        out: PathBuf,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Run {
            config,
            data,
            symbol,
            start,
            end,
            warmup_days,
            params_json,
            valuation_mode,
            costs,
            out,
        } => {
            let mut run = match &config {
                Some(path) => RunConfig::from_file(path)?,
                None => RunConfig::default(),
            };
            if let Some(source) = data.source() {
                run.data.csv = None;
                run.data.panel_csv = None;
                match source {
                    DataSource::Csv(p) => run.data.csv = Some(p),
                    DataSource::Panel(p) => run.data.panel_csv = Some(p),
                }
            }
            if let Some(s) = symbol {
                run.backtest.symbol = s;
            }
            run.data.start = start.or(run.data.start);
            run.data.end = end.or(run.data.end);
            run.data.warmup_days = warmup_days.or(run.data.warmup_days);
            if let Some(path) = params_json {
                run.strategy = load_params_json(&path)?;
            }
            if let Some(mode) = valuation_mode {
                run.backtest.valuation_mode = mode;
            }
            costs.apply(&mut run.costs);
            run_cmd(&run, &out)
        }
        Commands::Optimize {
            data,
            symbol,
            train_start,
            train_end,
            warmup_days,
            n_evals,
            seed,
            dd_penalty,
            costs,
            out,
        } => {
            let sweep = SweepConfig {
                n_evals,
                seed,
                dd_penalty,
            };
            optimize_cmd(
                &data,
                &symbol,
                Window::new(Some(train_start), Some(train_end)),
                warmup_days,
                &sweep,
                &costs,
                &out,
            )
        }
        Commands::Validate {
            data,
            symbol,
            params,
            valid_start,
            valid_end,
            warmup_days,
            costs,
            out,
        } => validate_cmd(
            &data,
            &symbol,
            &params,
            Window::new(Some(valid_start), Some(valid_end)),
            warmup_days,
            &costs,
            &out,
        ),
    }
}

fn run_cmd(run: &RunConfig, out: &Path) -> Result<()> {
    let result = stacklab_runner::run_from_config(run)?;
    print_summary("RUN", &result);
    let artifacts = save_run(&result, out)?;
    println!("Artifacts saved to: {}", artifacts.dir.display());
    Ok(())
}

fn engine_config(symbol: &str, strategy: StrategyConfig, costs: &CostArgs) -> EngineConfig {
    let mut config = EngineConfig {
        strategy,
        ..EngineConfig::default()
    };
    config.backtest.symbol = symbol.to_string();
    costs.apply(&mut config.costs);
    config
}

fn load_window(
    data: &DataArgs,
    symbol: &str,
    window: Window,
    warmup_days: i64,
    config: &EngineConfig,
) -> Result<(Vec<stacklab_core::domain::Bar>, Window)> {
    window.validate()?;
    let Some(source) = data.source() else {
        bail!("one of --csv or --panel-csv is required");
    };
    let range = fetch_range(window, Some(warmup_days), &config.indicators);
    let bars = load_source(&source, symbol, range)
        .with_context(|| format!("failed to load bars for {symbol}"))?;
    Ok((bars, range))
}

/// Entries listed after a search.
const TOP_N: usize = 5;

fn optimize_cmd(
    data: &DataArgs,
    symbol: &str,
    window: Window,
    warmup_days: i64,
    sweep: &SweepConfig,
    costs: &CostArgs,
    out: &Path,
) -> Result<()> {
    let base = engine_config(symbol, StrategyConfig::default(), costs);
    let (bars, range) = load_window(data, symbol, window, warmup_days, &base)?;
    let ctx = IndicatorContext::build(&bars, &base.indicators);

    info!(
        symbol,
        n_evals = sweep.n_evals,
        seed = sweep.seed,
        "starting parameter search"
    );
    let results = run_sweep(&ctx, &base, window, sweep, &ParamSpace::default());

    let meta = SweepMeta {
        symbol: symbol.to_string(),
        train_start: window.start,
        train_end: window.end,
        fetch_start: range.start,
        sweep: sweep.clone(),
        data_source: data.describe().to_string(),
        dataset_hash: dataset_hash(&bars).to_string(),
        indicators: base.indicators.clone(),
        costs: base.costs.clone(),
    };
    let artifacts = save_sweep(&results, &meta, out)?;
    println!("Saved: {}", artifacts.results.display());

    match results.best() {
        Some(best) => {
            println!("Best score (train): {}", best.score);
            println!("Best final equity (train): {}", best.metrics.final_equity);
            println!("Best CAGR (train): {}", best.metrics.cagr);
            println!("Best MaxDD (train): {}", best.metrics.max_drawdown);
            if let Some(path) = &artifacts.best_params {
                println!("Best params saved to: {}", path.display());
            }
            println!("Top {} (train):", TOP_N.min(results.len()));
            for e in results.top_n(TOP_N) {
                println!(
                    "  #{:<4} score={:.4} cagr={:.4} maxdd={:.4} trades={}",
                    e.index, e.score, e.metrics.cagr, e.metrics.max_drawdown, e.metrics.trade_count
                );
            }
        }
        None => println!("No evaluations were run."),
    }
    Ok(())
}

fn validate_cmd(
    data: &DataArgs,
    symbol: &str,
    params: &Path,
    window: Window,
    warmup_days: i64,
    costs: &CostArgs,
    out: &Path,
) -> Result<()> {
    let strategy = load_params_json(params)?;
    let config = engine_config(symbol, strategy, costs);
    let (bars, _) = load_window(data, symbol, window, warmup_days, &config)?;

    let result = run_single(&bars, &config, window)?;
    print_summary("VALID", &result);

    let artifacts = save_run(&result, out)?;
    let used = serde_json::to_string_pretty(&config.strategy)?;
    std::fs::write(out.join("used_params.json"), used)
        .with_context(|| format!("failed to write used_params.json in {}", out.display()))?;
    println!("Saved outputs to: {}", artifacts.dir.display());
    Ok(())
}

fn print_summary(label: &str, result: &BacktestResult) {
    let m = &result.metrics;
    println!("Symbol: {}", result.config.backtest.symbol);
    println!(
        "Bars: {} ({} warm-up), equity points: {}, trades: {}",
        result.bar_count,
        result.warmup_bars,
        result.equity_curve.len(),
        m.trade_count
    );
    println!("{label} final equity: {}", m.final_equity);
    println!("{label} CAGR: {}", m.cagr);
    println!("{label} MaxDD: {}", m.max_drawdown);
}
