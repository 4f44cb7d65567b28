//! Simulation engine: indicator context, cost model, decision logic and the
//! position state machine.

pub mod context;
pub mod cost_model;
pub mod decision;
pub mod loop_runner;
pub mod state;
pub mod trader;

pub use context::{IndicatorContext, IndicatorSnapshot, MacdPrev, PrevContext};
pub use cost_model::{CostModel, CostRates};
pub use decision::decide_target;
pub use loop_runner::{run_backtest, run_with_context};
pub use state::{EngineState, RunResult};
pub use trader::PositionStateMachine;
