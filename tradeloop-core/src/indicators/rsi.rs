//! Relative Strength Index (RSI).
//!
//! Wilder smoothing (alpha = 1/period) of average gains and losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period.
//! Edge cases: no movement → 50; avg_loss == 0 → 100; avg_gain == 0 → 0.

use super::Indicator;
use crate::domain::Candle;

/// Wilder-smoothed running average, seeded with a simple mean.
#[derive(Debug, Clone)]
pub(crate) struct WilderState {
    period: usize,
    seen: usize,
    sum: f64,
    value: f64,
}

impl WilderState {
    pub(crate) fn new(period: usize) -> Self {
        Self {
            period,
            seen: 0,
            sum: 0.0,
            value: f64::NAN,
        }
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.period);
    }

    pub(crate) fn push(&mut self, x: f64) -> f64 {
        self.seen += 1;
        if self.seen < self.period {
            self.sum += x;
        } else if self.seen == self.period {
            self.sum += x;
            self.value = self.sum / self.period as f64;
        } else {
            let p = self.period as f64;
            self.value = (self.value * (p - 1.0) + x) / p;
        }
        self.value
    }
}

/// Running RSI over an arbitrary price stream.
#[derive(Debug, Clone)]
pub(crate) struct RsiState {
    prev: Option<f64>,
    gains: WilderState,
    losses: WilderState,
    tainted: bool,
}

impl RsiState {
    pub(crate) fn new(period: usize) -> Self {
        Self {
            prev: None,
            gains: WilderState::new(period),
            losses: WilderState::new(period),
            tainted: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.prev = None;
        self.gains.reset();
        self.losses.reset();
        self.tainted = false;
    }

    pub(crate) fn push(&mut self, price: f64) -> f64 {
        if self.tainted {
            return f64::NAN;
        }
        if price.is_nan() {
            self.tainted = true;
            return f64::NAN;
        }
        let Some(prev) = self.prev.replace(price) else {
            return f64::NAN;
        };
        let change = price - prev;
        let avg_gain = self.gains.push(change.max(0.0));
        let avg_loss = self.losses.push((-change).max(0.0));
        if avg_gain.is_nan() || avg_loss.is_nan() {
            return f64::NAN;
        }
        compute_rsi(avg_gain, avg_loss)
    }
}

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    state: RsiState,
    outputs: [String; 1],
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            state: RsiState::new(period),
            outputs: [format!("rsi_{period}")],
        }
    }
}

impl Indicator for Rsi {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn reset(&mut self) {
        self.state.reset();
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        vec![self.state.push(candle.close)]
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
