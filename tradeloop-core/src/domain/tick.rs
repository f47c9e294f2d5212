//! Price tick as delivered by the tick source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Direction;

/// A single bid/ask quote. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>, bid: f64, ask: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            bid,
            ask,
        }
    }

    /// Price used to build candles.
    pub fn price(&self) -> f64 {
        self.bid
    }

    /// Price at which a position of `direction` would be closed.
    pub fn exit_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Short => self.ask,
            _ => self.bid,
        }
    }

    /// Price at which a position of `direction` would be opened.
    pub fn entry_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Short => self.bid,
            _ => self.ask,
        }
    }

    /// Both sides finite and positive, ask not below bid.
    pub fn is_valid(&self) -> bool {
        self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0 && self.ask >= self.bid
    }
}
