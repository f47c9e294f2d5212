//! Candlestick pattern strategies.

use crate::domain::{Candle, Direction};
use crate::indicators::{names, IndicatorValues};

use super::{last_index, require, Strategy, StrategyError};

/// Hammer in a downtrend: long lower shadow, small upper shadow, close
/// under EMA50 and RSI oversold.
#[derive(Debug, Clone)]
pub struct Hammer {
    rsi_oversold: f64,
}

impl Hammer {
    pub fn new(rsi_oversold: f64) -> Self {
        Self { rsi_oversold }
    }
}

impl Strategy for Hammer {
    fn name(&self) -> &str {
        "hammer"
    }

    fn warmup(&self) -> usize {
        50
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let c = &candles[i];
        let body = c.body();
        if body == 0.0 {
            return Ok(Direction::Neutral);
        }
        let shaped = c.lower_shadow() >= 2.0 * body && c.upper_shadow() < 0.5 * body;
        if !shaped {
            return Ok(Direction::Neutral);
        }
        let ema = require(indicators, names::EMA_50, i)?;
        let rsi = require(indicators, names::RSI_14, i)?;
        if c.close < ema && rsi < self.rsi_oversold {
            Ok(Direction::Long)
        } else {
            Ok(Direction::Neutral)
        }
    }
}

/// Two-candle engulfing reversal.
#[derive(Debug, Clone, Copy)]
pub struct Engulfing;

impl Strategy for Engulfing {
    fn name(&self) -> &str {
        "engulfing"
    }

    fn warmup(&self) -> usize {
        2
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        _indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let (prev, now) = (&candles[i - 1], &candles[i]);
        if prev.is_bearish()
            && now.is_bullish()
            && now.close >= prev.open
            && now.open <= prev.close
        {
            return Ok(Direction::Long);
        }
        if prev.is_bullish()
            && now.is_bearish()
            && now.open >= prev.close
            && now.close <= prev.open
        {
            return Ok(Direction::Short);
        }
        Ok(Direction::Neutral)
    }
}

/// Near-shadowless candle in the direction of the EMA50 trend.
#[derive(Debug, Clone)]
pub struct Marubozu {
    min_body_ratio: f64,
}

impl Marubozu {
    pub fn new(min_body_ratio: f64) -> Self {
        Self { min_body_ratio }
    }
}

impl Strategy for Marubozu {
    fn name(&self) -> &str {
        "marubozu"
    }

    fn warmup(&self) -> usize {
        50
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let c = &candles[i];
        let range = c.range();
        if range <= 0.0 || c.body() / range <= self.min_body_ratio {
            return Ok(Direction::Neutral);
        }
        let ema = require(indicators, names::EMA_50, i)?;
        if c.is_bullish() && c.close > ema {
            Ok(Direction::Long)
        } else if c.is_bearish() && c.close < ema {
            Ok(Direction::Short)
        } else {
            Ok(Direction::Neutral)
        }
    }
}

/// Shooting star after a bullish candle.
#[derive(Debug, Clone, Copy)]
pub struct ShootingStar;

impl Strategy for ShootingStar {
    fn name(&self) -> &str {
        "shooting_star"
    }

    fn warmup(&self) -> usize {
        2
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        _indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let c = &candles[i];
        let body = c.body();
        if body == 0.0 {
            return Ok(Direction::Neutral);
        }
        if c.upper_shadow() >= 2.0 * body
            && c.lower_shadow() < 0.5 * body
            && candles[i - 1].is_bullish()
        {
            Ok(Direction::Short)
        } else {
            Ok(Direction::Neutral)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn ohlc(rows: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        rows.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                open_time: base + Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                tick_count: 1,
            })
            .collect()
    }

    fn padded(last: &[(f64, f64, f64, f64)], total: usize) -> Vec<Candle> {
        let mut rows = vec![(10.0, 10.5, 9.5, 10.0); total - last.len()];
        rows.extend_from_slice(last);
        ohlc(&rows)
    }

    #[test]
    fn bullish_and_bearish_engulfing() {
        let up = ohlc(&[(10.0, 10.1, 9.4, 9.5), (9.4, 10.3, 9.3, 10.2)]);
        assert_eq!(Engulfing.evaluate(&up, &IndicatorValues::new()), Ok(Direction::Long));
        let down = ohlc(&[(9.5, 10.1, 9.4, 10.0), (10.1, 10.2, 9.3, 9.4)]);
        assert_eq!(Engulfing.evaluate(&down, &IndicatorValues::new()), Ok(Direction::Short));
        let inside = ohlc(&[(10.0, 10.1, 9.4, 9.5), (9.6, 9.9, 9.5, 9.8)]);
        assert_eq!(
            Engulfing.evaluate(&inside, &IndicatorValues::new()),
            Ok(Direction::Neutral)
        );
    }

    #[test]
    fn hammer_needs_downtrend_and_oversold() {
        // body 0.1, lower shadow 0.5, upper shadow 0.02
        let candles = padded(&[(10.0, 10.12, 9.5, 10.1)], 60);
        let mut iv = IndicatorValues::new();
        iv.insert(names::EMA_50, vec![10.5; 60]);
        iv.insert(names::RSI_14, vec![30.0; 60]);
        let hammer = Hammer::new(35.0);
        assert_eq!(hammer.evaluate(&candles, &iv), Ok(Direction::Long));
        iv.insert(names::RSI_14, vec![45.0; 60]);
        assert_eq!(hammer.evaluate(&candles, &iv), Ok(Direction::Neutral));
    }

    #[test]
    fn hammer_shape_without_indicators_abstains() {
        let candles = padded(&[(10.0, 10.12, 9.5, 10.1)], 60);
        assert!(Hammer::new(35.0)
            .evaluate(&candles, &IndicatorValues::new())
            .is_err());
    }

    #[test]
    fn marubozu_follows_trend() {
        let candles = padded(&[(10.0, 11.0, 10.0, 11.0)], 55);
        let mut iv = IndicatorValues::new();
        iv.insert(names::EMA_50, vec![10.5; 55]);
        assert_eq!(Marubozu::new(0.98).evaluate(&candles, &iv), Ok(Direction::Long));
        iv.insert(names::EMA_50, vec![11.5; 55]);
        assert_eq!(Marubozu::new(0.98).evaluate(&candles, &iv), Ok(Direction::Neutral));
    }

    #[test]
    fn shooting_star_after_bullish_candle() {
        // prev bullish; now body 0.1, upper shadow 0.5, lower shadow 0.02
        let candles = ohlc(&[(9.5, 10.1, 9.4, 10.0), (10.1, 10.6, 9.98, 10.0)]);
        assert_eq!(
            ShootingStar.evaluate(&candles, &IndicatorValues::new()),
            Ok(Direction::Short)
        );
        let after_bear = ohlc(&[(10.0, 10.1, 9.4, 9.5), (10.1, 10.6, 9.98, 10.0)]);
        assert_eq!(
            ShootingStar.evaluate(&after_bear, &IndicatorValues::new()),
            Ok(Direction::Neutral)
        );
    }
}
