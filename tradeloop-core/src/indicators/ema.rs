//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` closes.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

/// Running EMA over an arbitrary input stream.
#[derive(Debug, Clone)]
pub(crate) struct EmaState {
    period: usize,
    alpha: f64,
    seen: usize,
    seed_sum: f64,
    value: f64,
    tainted: bool,
}

impl EmaState {
    pub(crate) fn new(period: usize) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            seen: 0,
            seed_sum: 0.0,
            value: f64::NAN,
            tainted: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.period);
    }

    /// Feed one value; returns the EMA or NaN while seeding.
    pub(crate) fn push(&mut self, x: f64) -> f64 {
        if self.tainted {
            return f64::NAN;
        }
        if x.is_nan() {
            // NaN propagates: everything after it is tainted
            self.tainted = true;
            self.value = f64::NAN;
            return f64::NAN;
        }
        self.seen += 1;
        if self.seen < self.period {
            self.seed_sum += x;
            f64::NAN
        } else if self.seen == self.period {
            self.seed_sum += x;
            self.value = self.seed_sum / self.period as f64;
            self.value
        } else {
            self.value = self.alpha * x + (1.0 - self.alpha) * self.value;
            self.value
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ema {
    state: EmaState,
    outputs: [String; 1],
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            state: EmaState::new(period),
            outputs: [format!("ema_{period}")],
        }
    }
}

impl Indicator for Ema {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.state.period.saturating_sub(1)
    }

    fn reset(&mut self) {
        self.state.reset();
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        vec![self.state.push(candle.close)]
    }
}
