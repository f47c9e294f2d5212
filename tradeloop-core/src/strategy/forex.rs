//! Indicator-driven forex strategies.

use crate::domain::{Candle, Direction};
use crate::indicators::{names, IndicatorSpec, IndicatorValues};

use super::{last_index, require, Strategy, StrategyError};

// ── MA crossover ─────────────────────────────────────────────────────

/// Fast EMA crossing the slow EMA on the last candle.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    fast: usize,
    slow: usize,
    fast_name: String,
    slow_name: String,
}

impl MaCrossover {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast,
            slow,
            fast_name: format!("ema_{fast}"),
            slow_name: format!("ema_{slow}"),
        }
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn warmup(&self) -> usize {
        self.slow + 1
    }

    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        vec![IndicatorSpec::Ema(self.fast), IndicatorSpec::Ema(self.slow)]
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let fast_now = require(indicators, &self.fast_name, i)?;
        let slow_now = require(indicators, &self.slow_name, i)?;
        let fast_prev = require(indicators, &self.fast_name, i - 1)?;
        let slow_prev = require(indicators, &self.slow_name, i - 1)?;

        if fast_now > slow_now && fast_prev <= slow_prev {
            Ok(Direction::Long)
        } else if fast_now < slow_now && fast_prev >= slow_prev {
            Ok(Direction::Short)
        } else {
            Ok(Direction::Neutral)
        }
    }
}

// ── Momentum: RSI + MACD with a long-EMA trend filter ────────────────

/// Trades with the long-EMA trend when MACD agrees and RSI sits in a
/// pullback band (40–70 for longs, 30–60 for shorts).
#[derive(Debug, Clone)]
pub struct MomentumRsiMacd {
    trend_period: usize,
    trend_name: String,
}

impl MomentumRsiMacd {
    pub fn new(trend_period: usize) -> Self {
        Self {
            trend_period,
            trend_name: format!("ema_{trend_period}"),
        }
    }
}

impl Strategy for MomentumRsiMacd {
    fn name(&self) -> &str {
        "momentum_rsi_macd"
    }

    fn warmup(&self) -> usize {
        self.trend_period.max(34)
    }

    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        vec![IndicatorSpec::Ema(self.trend_period)]
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let close = candles[i].close;
        let trend = require(indicators, &self.trend_name, i)?;
        let rsi = require(indicators, names::RSI_14, i)?;
        let macd = require(indicators, names::MACD, i)?;
        let signal = require(indicators, names::MACD_SIGNAL, i)?;

        if close > trend && macd > signal && rsi > 40.0 && rsi < 70.0 {
            Ok(Direction::Long)
        } else if close < trend && macd < signal && rsi > 30.0 && rsi < 60.0 {
            Ok(Direction::Short)
        } else {
            Ok(Direction::Neutral)
        }
    }
}

// ── Bollinger breakout / band rejection ──────────────────────────────

/// Close breaking out of a Bollinger band (with an RSI exhaustion guard),
/// or a wick touching a band and closing back inside.
#[derive(Debug, Clone)]
pub struct BollingerBreakout {
    period: usize,
    k: f64,
    upper: String,
    lower: String,
}

impl BollingerBreakout {
    /// Tolerance for a wick "touching" a band.
    const TOUCH: f64 = 0.002;

    pub fn new(period: usize, k: f64) -> Self {
        Self {
            period,
            k,
            upper: format!("bb_upper_{period}_{k}"),
            lower: format!("bb_lower_{period}_{k}"),
        }
    }
}

impl Strategy for BollingerBreakout {
    fn name(&self) -> &str {
        "bollinger_breakout"
    }

    fn warmup(&self) -> usize {
        self.period + 1
    }

    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        vec![IndicatorSpec::Bollinger {
            period: self.period,
            k: self.k,
        }]
    }

    fn evaluate(
        &self,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Result<Direction, StrategyError> {
        let i = last_index(candles, self.warmup())?;
        let (now, prev) = (&candles[i], &candles[i - 1]);
        let upper = require(indicators, &self.upper, i)?;
        let lower = require(indicators, &self.lower, i)?;
        let upper_prev = require(indicators, &self.upper, i - 1)?;
        let lower_prev = require(indicators, &self.lower, i - 1)?;
        let rsi = indicators.get(names::RSI_14, i).unwrap_or(50.0);

        if now.close > upper && prev.close <= upper_prev && rsi < 85.0 {
            return Ok(Direction::Long);
        }
        if now.close < lower && prev.close >= lower_prev && rsi > 15.0 {
            return Ok(Direction::Short);
        }
        if now.low <= lower * (1.0 + Self::TOUCH) && now.close > lower && now.close > prev.close {
            return Ok(Direction::Long);
        }
        if now.high >= upper * (1.0 - Self::TOUCH) && now.close < upper && now.close < prev.close {
            return Ok(Direction::Short);
        }
        Ok(Direction::Neutral)
    }
}
