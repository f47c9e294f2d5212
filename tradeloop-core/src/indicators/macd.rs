//! Moving Average Convergence Divergence.
//!
//! MACD = EMA(fast) - EMA(slow); signal = EMA(MACD, signal); histogram = MACD - signal.
//! The signal EMA starts seeding at the first defined MACD value.

use super::ema::EmaState;
use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Macd {
    slow_period: usize,
    signal_period: usize,
    fast: EmaState,
    slow: EmaState,
    signal: EmaState,
    outputs: [String; 3],
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && slow > fast, "MACD needs 1 <= fast < slow");
        assert!(signal >= 1, "MACD signal period must be >= 1");
        let suffix = format!("{fast}_{slow}_{signal}");
        Self {
            slow_period: slow,
            signal_period: signal,
            fast: EmaState::new(fast),
            slow: EmaState::new(slow),
            signal: EmaState::new(signal),
            outputs: [
                format!("macd_{suffix}"),
                format!("macd_signal_{suffix}"),
                format!("macd_hist_{suffix}"),
            ],
        }
    }
}

impl Indicator for Macd {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.slow_period + self.signal_period - 2
    }

    fn reset(&mut self) {
        self.fast.reset();
        self.slow.reset();
        self.signal.reset();
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        let fast = self.fast.push(candle.close);
        let slow = self.slow.push(candle.close);
        let line = fast - slow;
        if line.is_nan() {
            return vec![f64::NAN; 3];
        }
        let signal = self.signal.push(line);
        vec![line, signal, line - signal]
    }
}
