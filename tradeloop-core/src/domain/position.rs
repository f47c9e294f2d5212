//! Open positions and settled trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::signal::{Category, Direction};

/// Venue-assigned position identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Engine-assigned identifier for an open request awaiting the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Strategy settings that keep influencing a position after it opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyContext {
    pub source_id: String,
    pub use_signal_change: bool,
    pub use_pattern_reversal: bool,
    pub atr_trailing_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Open,
    /// A close has been submitted and the venue has not answered yet.
    Closing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub symbol: String,
    pub category: Category,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub trailing_enabled: bool,
    pub opened_at_candle: usize,
    pub opened_at: DateTime<Utc>,
    pub strategy: StrategyContext,
    /// Last computed unrealized P/L in account currency.
    pub floating_pnl: f64,
    pub state: PositionState,
    /// Number of times the trailing logic tightened the stop.
    pub stop_adjustments: u32,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Stop hit after the trailing logic moved it.
    TrailingStop,
    SignalChange,
    PatternReversal,
    DailyProfitLimit,
    CandleProfitLimit,
    /// Position disappeared from the venue without an engine-initiated close.
    External,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Immutable settlement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    /// Price P/L before commission.
    pub gross_pnl: f64,
    pub commission: f64,
    /// `gross_pnl - commission`; the amount applied to the balance.
    pub realized_pnl: f64,
    pub closed_at: DateTime<Utc>,
    /// False when the venue reported no profit and the last floating
    /// P/L was used instead.
    pub reconciled: bool,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }
}
