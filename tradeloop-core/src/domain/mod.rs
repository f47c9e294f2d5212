//! Domain types shared by every stage of the decision pipeline.

pub mod account;
pub mod candle;
pub mod position;
pub mod signal;
pub mod tick;

pub use account::AccountState;
pub use candle::{Candle, CandleSeries, GapMarker, SeriesError, Timeframe};
pub use position::{
    ClosedTrade, ExitReason, Position, PositionState, RequestId, StrategyContext, Ticket,
};
pub use signal::{Category, Direction, Signal};
pub use tick::Tick;
