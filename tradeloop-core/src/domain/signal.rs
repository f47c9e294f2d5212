//! Directional signals produced by strategies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Trade direction. `Neutral` means "no signal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// +1 for Long, -1 for Short, 0 for Neutral.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Neutral => Direction::Neutral,
        }
    }

    pub fn is_neutral(self) -> bool {
        self == Direction::Neutral
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Neutral => "neutral",
        };
        f.write_str(s)
    }
}

/// Strategy family. Each family has its own admission slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Forex,
    Candle,
    Custom,
}

impl Category {
    /// Evaluation order within one candle cycle.
    pub const EVALUATION_ORDER: [Category; 3] = [Category::Candle, Category::Forex, Category::Custom];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Forex => "forex",
            Category::Candle => "candle",
            Category::Custom => "custom",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-persistent signal for one decision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub direction: Direction,
    pub source_id: String,
    pub category: Category,
    pub candle_index: usize,
    /// Confidence and context values (e.g. confirmation votes).
    pub metadata: HashMap<String, f64>,
}

impl Signal {
    pub fn new(
        direction: Direction,
        source_id: impl Into<String>,
        category: Category,
        candle_index: usize,
    ) -> Self {
        Self {
            direction,
            source_id: source_id.into(),
            category,
            candle_index,
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_involutive() {
        for d in [Direction::Long, Direction::Short, Direction::Neutral] {
            assert_eq!(d.opposite().opposite(), d);
        }
        assert_eq!(Direction::Long.sign() + Direction::Short.sign(), 0.0);
    }

    #[test]
    fn candle_category_is_evaluated_first() {
        assert_eq!(Category::EVALUATION_ORDER[0], Category::Candle);
        assert_eq!(Category::EVALUATION_ORDER[1], Category::Forex);
    }
}
