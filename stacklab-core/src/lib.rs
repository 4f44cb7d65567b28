//! StackLab Core: moving-average stack trading engine.
//!
//! This crate contains the simulation engine:
//! - Domain types (bars, positions, trade events, equity points)
//! - Configuration records and optimizer parameter import
//! - Indicators computed once per data set, with a lagged per-bar context
//! - Cost model (commission, sell-side tax, short borrow)
//! - Position state machine with stop/forced-cover precedence
//! - Dataset/config fingerprints and a deterministic RNG hierarchy

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod indicators;
pub mod rng;

pub use config::{
    BacktestConfig, CostConfig, EngineConfig, IndicatorConfig, MacdSignalMode, ParamError,
    PrevCloseRef, StrategyConfig, ValuationMode,
};
