//! Immutable configuration records for a single backtest run.
//!
//! Every record deserializes with `#[serde(default)]` so partial TOML/JSON
//! files are accepted. Enum-like fields parse case-insensitively.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors importing an external parameter mapping.
#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("parameter '{key}' expected {expected}, got {got}")]
    WrongType {
        key: String,
        expected: &'static str,
        got: String,
    },

    #[error("parameter '{key}': unknown value '{value}'")]
    UnknownVariant { key: String, value: String },
}

// ─── Enum-like fields ────────────────────────────────────────────────

/// Price used to mark the equity curve at the end of each bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValuationMode {
    #[default]
    Close,
    /// Legacy mode: mark at the following bar's open.
    NextOpen,
}

/// Moving average the previous-close filter compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PrevCloseRef {
    Week,
    #[default]
    Fast,
}

/// How MACD bull/bear regime is read from the previous bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MacdSignalMode {
    /// line vs signal
    #[default]
    Cross,
    /// histogram sign
    Hist,
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lower = s.trim().to_ascii_lowercase();
                $(
                    if lower == $text.to_ascii_lowercase() $(|| lower == $alias)* {
                        return Ok($ty::$variant);
                    }
                )+
                Err(s.to_string())
            }
        }

        impl TryFrom<String> for $ty {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse().map_err(|v| format!("unknown {} '{}'", stringify!($ty), v))
            }
        }

        impl From<$ty> for String {
            fn from(v: $ty) -> String {
                v.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(ValuationMode { Close => "CLOSE", NextOpen => "NEXT_OPEN" | "nextopen" | "next-open" });
string_enum!(PrevCloseRef { Week => "week", Fast => "fast" });
string_enum!(MacdSignalMode { Cross => "cross", Hist => "hist" | "histogram" });

// ─── Records ─────────────────────────────────────────────────────────

/// Indicator window lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub sma_week: usize,
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub sma_long_term: usize,
    pub long_trend_lookback: usize,
    pub atr_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_week: 5,
            sma_fast: 20,
            sma_slow: 40,
            sma_long_term: 180,
            long_trend_lookback: 20,
            atr_window: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
        }
    }
}

impl IndicatorConfig {
    /// Longest lookback any indicator needs before it is fully formed.
    pub fn max_lookback(&self) -> usize {
        [
            self.sma_long_term + self.long_trend_lookback,
            self.atr_window,
            self.sma_slow,
            self.macd_slow + 3 * self.macd_signal,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Strategy knobs for the moving-average stack trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub spread_enter_pct: f64,
    pub spread_exit_pct: f64,

    pub use_atr_filter: bool,
    pub atr_enter_k: f64,
    pub atr_exit_k: f64,

    pub confirm_days: usize,
    pub min_hold_bars: usize,
    pub cooldown_bars: usize,

    pub use_long_trend_filter: bool,
    pub use_short_trend_filter: bool,
    pub enable_short: bool,

    pub long_daily_stop: f64,
    pub long_trail_stop: f64,
    pub short_daily_stop: f64,
    pub short_trail_stop: f64,

    pub use_prev_close_filter: bool,
    pub prev_close_filter_ref: PrevCloseRef,

    pub use_macd_regime_filter: bool,
    pub use_macd_exit: bool,
    pub macd_signal_mode: MacdSignalMode,
    pub use_macd_size_scaling: bool,
    pub macd_size_min: f64,
    pub macd_size_max: f64,
    pub macd_size_atr_k: f64,

    pub max_units: u32,
    pub pyramid_step_return: f64,
    pub give_up_max_bars: usize,
    pub give_up_drawdown_pct: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            spread_enter_pct: 0.0030,
            spread_exit_pct: 0.0010,
            use_atr_filter: true,
            atr_enter_k: 0.35,
            atr_exit_k: 0.10,
            confirm_days: 2,
            min_hold_bars: 3,
            cooldown_bars: 0,
            use_long_trend_filter: true,
            use_short_trend_filter: false,
            enable_short: true,
            long_daily_stop: 0.05,
            long_trail_stop: 0.10,
            short_daily_stop: 0.03,
            short_trail_stop: 0.10,
            use_prev_close_filter: false,
            prev_close_filter_ref: PrevCloseRef::Fast,
            use_macd_regime_filter: false,
            use_macd_exit: false,
            macd_signal_mode: MacdSignalMode::Cross,
            use_macd_size_scaling: false,
            macd_size_min: 0.6,
            macd_size_max: 1.0,
            macd_size_atr_k: 1.0,
            max_units: 1,
            pyramid_step_return: 1e9,
            give_up_max_bars: 0,
            give_up_drawdown_pct: 0.0,
        }
    }
}

impl StrategyConfig {
    /// Build from an optimizer parameter mapping with PascalCase keys
    /// (`{"SpreadEnterPct": 0.003, "UseATRFilter": true, ...}`).
    ///
    /// Unknown keys are ignored. Fields not present keep their defaults.
    pub fn from_params_map(params: &Map<String, Value>) -> Result<Self, ParamError> {
        let mut cfg = Self::default();
        cfg.apply_params_map(params)?;
        Ok(cfg)
    }

    /// Overlay a PascalCase parameter mapping onto `self`.
    pub fn apply_params_map(&mut self, params: &Map<String, Value>) -> Result<(), ParamError> {
        for (key, value) in params {
            let k = key.as_str();
            match k {
                "SpreadEnterPct" => self.spread_enter_pct = as_f64(k, value)?,
                "SpreadExitPct" => self.spread_exit_pct = as_f64(k, value)?,
                "UseATRFilter" => self.use_atr_filter = as_bool(k, value)?,
                "AtrEnterK" => self.atr_enter_k = as_f64(k, value)?,
                "AtrExitK" => self.atr_exit_k = as_f64(k, value)?,
                "ConfirmDays" => self.confirm_days = as_usize(k, value)?,
                "MinHoldDays" => self.min_hold_bars = as_usize(k, value)?,
                "CooldownDays" => self.cooldown_bars = as_usize(k, value)?,
                "UseLongTrendFilter" => self.use_long_trend_filter = as_bool(k, value)?,
                "UseShortTrendFilter" => self.use_short_trend_filter = as_bool(k, value)?,
                "EnableShort" => self.enable_short = as_bool(k, value)?,
                "LongDailyStop" => self.long_daily_stop = as_f64(k, value)?,
                "LongTrailStop" => self.long_trail_stop = as_f64(k, value)?,
                "ShortDailyStop" => self.short_daily_stop = as_f64(k, value)?,
                "ShortTrailStop" => self.short_trail_stop = as_f64(k, value)?,
                "UsePrevCloseFilter" => self.use_prev_close_filter = as_bool(k, value)?,
                "PrevCloseFilterRef" => self.prev_close_filter_ref = as_enum(k, value)?,
                "UseMACDRegimeFilter" => self.use_macd_regime_filter = as_bool(k, value)?,
                "UseMACDExit" => self.use_macd_exit = as_bool(k, value)?,
                "MACDSignalMode" => self.macd_signal_mode = as_enum(k, value)?,
                "UseMACDSizeScaling" => self.use_macd_size_scaling = as_bool(k, value)?,
                "MACDSizeMin" => self.macd_size_min = as_f64(k, value)?,
                "MACDSizeMax" => self.macd_size_max = as_f64(k, value)?,
                "MACDSizeAtrK" => self.macd_size_atr_k = as_f64(k, value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Export the optimizer-facing subset as a PascalCase mapping.
    pub fn to_params_map(&self) -> Map<String, Value> {
        let mut m = Map::new();
        let mut put = |k: &str, v: Value| {
            m.insert(k.to_string(), v);
        };
        put("SpreadEnterPct", self.spread_enter_pct.into());
        put("SpreadExitPct", self.spread_exit_pct.into());
        put("UseATRFilter", self.use_atr_filter.into());
        put("AtrEnterK", self.atr_enter_k.into());
        put("AtrExitK", self.atr_exit_k.into());
        put("ConfirmDays", self.confirm_days.into());
        put("MinHoldDays", self.min_hold_bars.into());
        put("CooldownDays", self.cooldown_bars.into());
        put("UseLongTrendFilter", self.use_long_trend_filter.into());
        put("UseShortTrendFilter", self.use_short_trend_filter.into());
        put("EnableShort", self.enable_short.into());
        put("LongDailyStop", self.long_daily_stop.into());
        put("LongTrailStop", self.long_trail_stop.into());
        put("ShortDailyStop", self.short_daily_stop.into());
        put("ShortTrailStop", self.short_trail_stop.into());
        put("UsePrevCloseFilter", self.use_prev_close_filter.into());
        put("PrevCloseFilterRef", self.prev_close_filter_ref.as_str().into());
        put("UseMACDRegimeFilter", self.use_macd_regime_filter.into());
        put("UseMACDExit", self.use_macd_exit.into());
        put("MACDSignalMode", self.macd_signal_mode.as_str().into());
        put("UseMACDSizeScaling", self.use_macd_size_scaling.into());
        put("MACDSizeMin", self.macd_size_min.into());
        put("MACDSizeMax", self.macd_size_max.into());
        put("MACDSizeAtrK", self.macd_size_atr_k.into());
        m
    }

    /// Effective unit cap (never below one).
    pub fn effective_max_units(&self) -> u32 {
        self.max_units.max(1)
    }
}

fn type_name(v: &Value) -> String {
    match v {
        Value::Null => "null".into(),
        Value::Bool(_) => "bool".into(),
        Value::Number(_) => "number".into(),
        Value::String(s) => format!("string '{s}'"),
        Value::Array(_) => "array".into(),
        Value::Object(_) => "object".into(),
    }
}

fn wrong(key: &str, expected: &'static str, v: &Value) -> ParamError {
    ParamError::WrongType {
        key: key.to_string(),
        expected,
        got: type_name(v),
    }
}

fn as_f64(key: &str, v: &Value) -> Result<f64, ParamError> {
    match v {
        Value::Number(n) => n.as_f64().ok_or_else(|| wrong(key, "number", v)),
        Value::String(s) => s.trim().parse().map_err(|_| wrong(key, "number", v)),
        _ => Err(wrong(key, "number", v)),
    }
}

fn as_usize(key: &str, v: &Value) -> Result<usize, ParamError> {
    let x = as_f64(key, v).map_err(|_| wrong(key, "non-negative integer", v))?;
    if x.is_finite() && x >= 0.0 && x.fract() == 0.0 {
        Ok(x as usize)
    } else {
        Err(wrong(key, "non-negative integer", v))
    }
}

fn as_bool(key: &str, v: &Value) -> Result<bool, ParamError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => n
            .as_f64()
            .map(|x| x != 0.0)
            .ok_or_else(|| wrong(key, "bool", v)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(wrong(key, "bool", v)),
        },
        _ => Err(wrong(key, "bool", v)),
    }
}

fn as_enum<T: FromStr>(key: &str, v: &Value) -> Result<T, ParamError> {
    match v {
        Value::String(s) => s.parse().map_err(|_| ParamError::UnknownVariant {
            key: key.to_string(),
            value: s.clone(),
        }),
        _ => Err(wrong(key, "string", v)),
    }
}

/// Transaction costs and short-selling constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub commission_rate: f64,
    /// Sell-side transaction tax.
    pub stt_rate: f64,
    pub short_borrow_annual_rate: f64,
    pub short_borrow_day_count: i64,
    pub enforce_short_max_hold: bool,
    pub short_max_hold_days: i64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.0,
            stt_rate: 0.0018,
            short_borrow_annual_rate: 0.04,
            short_borrow_day_count: 365,
            enforce_short_max_hold: false,
            short_max_hold_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub symbol: String,
    /// Accounting base in currency units.
    pub initial_capital: f64,
    pub valuation_mode: ValuationMode,
    /// Normalized equity at the start of the curve.
    pub initial_equity: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "005930.KS".to_string(),
            initial_capital: 1_000_000_000.0,
            valuation_mode: ValuationMode::Close,
            initial_equity: 1.0,
        }
    }
}

/// Every configuration record of one run, bundled for hashing and export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub indicators: IndicatorConfig,
    pub strategy: StrategyConfig,
    pub costs: CostConfig,
    pub backtest: BacktestConfig,
}
