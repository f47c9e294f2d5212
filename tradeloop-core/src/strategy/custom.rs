//! User-defined strategies that fit neither the forex nor the pattern family.

use crate::domain::{Candle, Direction};
use crate::indicators::IndicatorValues;

use super::{last_index, Strategy, StrategyError};

/// A candle whose body dominates its range signals in the body's direction.
#[derive(Debug, Clone)]
pub struct BodyDominance {
    threshold: f64,
}

impl BodyDominance {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Strategy for BodyDominance {
    fn name(&self) -> &str {
        "body_dominance"
    }

    fn warmup(&self) -> usize {
        1
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        _indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let c = &candles[last_index(candles, 1)?];
        let range = c.range();
        if range <= 0.0 || c.body() / range <= self.threshold {
            return Ok(Direction::Neutral);
        }
        if c.is_bullish() {
            Ok(Direction::Long)
        } else if c.is_bearish() {
            Ok(Direction::Short)
        } else {
            Ok(Direction::Neutral)
        }
    }
}
