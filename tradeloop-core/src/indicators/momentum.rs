//! Momentum: close[t] - close[t - period]. Lookback: period.

use super::{Indicator, RollingWindow};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Momentum {
    period: usize,
    window: RollingWindow,
    tainted: bool,
    outputs: [String; 1],
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "Momentum period must be >= 1");
        Self {
            period,
            window: RollingWindow::new(period + 1),
            tainted: false,
            outputs: [format!("momentum_{period}")],
        }
    }
}

impl Indicator for Momentum {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn reset(&mut self) {
        self.window.clear();
        self.tainted = false;
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        if self.tainted || candle.close.is_nan() {
            self.tainted = true;
            return vec![f64::NAN];
        }
        if !self.window.push(candle.close) {
            return vec![f64::NAN];
        }
        let base = self.window.front().unwrap_or(f64::NAN);
        vec![candle.close - base]
    }
}
