//! Domain types for the moving-average stack trader.

pub mod bar;
pub mod equity;
pub mod ids;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use equity::EquityPoint;
pub use ids::{ConfigHash, DatasetHash};
pub use position::{Direction, PositionState};
pub use trade::{TradeEvent, TradeReason, TradeSide};
