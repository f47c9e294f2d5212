//! Quorum confirmation of candidate signals.
//!
//! Four independent checks vote on a direction:
//! 1. trend: close above (long) / below (short) EMA50
//! 2. RSI strictly inside the open band (not exhausted)
//! 3. MACD line above (long) / below (short) its signal line
//! 4. momentum sign agrees; undefined momentum counts as agreeing
//!
//! The signal passes with at least `min_votes` agreements. Undefined EMA50,
//! RSI or MACD fails closed.

use serde::{Deserialize, Serialize};

use crate::config::ConfirmationConfig;
use crate::domain::{Candle, Direction};
use crate::indicators::{names, IndicatorValues};

/// Outcome of one confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub trend: bool,
    pub rsi_band: bool,
    pub macd: bool,
    pub momentum: bool,
    pub votes: u8,
    pub passed: bool,
}

impl Confirmation {
    fn rejected() -> Self {
        Self {
            trend: false,
            rsi_band: false,
            macd: false,
            momentum: false,
            votes: 0,
            passed: false,
        }
    }
}

/// Strategy-agnostic quorum gate.
#[derive(Debug, Clone)]
pub struct SignalConfirmer {
    rsi_lower: f64,
    rsi_upper: f64,
    min_votes: u8,
}

impl SignalConfirmer {
    pub fn new(config: &ConfirmationConfig) -> Self {
        Self {
            rsi_lower: config.rsi_lower,
            rsi_upper: config.rsi_upper,
            min_votes: config.min_votes,
        }
    }

    /// Vote on `direction` at the last candle of `candles`.
    pub fn confirm(
        &self,
        direction: Direction,
        candles: &[Candle],
        indicators: &IndicatorValues,
    ) -> Confirmation {
        let Some(last) = candles.last() else {
            return Confirmation::rejected();
        };
        if direction.is_neutral() {
            return Confirmation::rejected();
        }
        let i = candles.len() - 1;
        let (Some(ema), Some(rsi), Some(macd), Some(signal)) = (
            indicators.get(names::EMA_50, i),
            indicators.get(names::RSI_14, i),
            indicators.get(names::MACD, i),
            indicators.get(names::MACD_SIGNAL, i),
        ) else {
            return Confirmation::rejected();
        };
        let sign = direction.sign();

        let trend = sign * (last.close - ema) > 0.0;
        let rsi_band = rsi > self.rsi_lower && rsi < self.rsi_upper;
        let macd_ok = sign * (macd - signal) > 0.0;
        let momentum = indicators
            .get(names::MOMENTUM_10, i)
            .map_or(true, |m| sign * m > 0.0);

        let votes = [trend, rsi_band, macd_ok, momentum]
            .iter()
            .filter(|v| **v)
            .count() as u8;
        Confirmation {
            trend,
            rsi_band,
            macd: macd_ok,
            momentum,
            votes,
            passed: votes >= self.min_votes,
        }
    }
}
