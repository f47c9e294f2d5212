//! Stochastic RSI.
//!
//! raw = 100 * (RSI - min(RSI, stoch)) / (max(RSI, stoch) - min(RSI, stoch))
//! %K = SMA(raw, k); %D = SMA(%K, d). A flat RSI window yields raw = 50.

use super::rsi::RsiState;
use super::{Indicator, RollingWindow};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct StochRsi {
    rsi_period: usize,
    rsi: RsiState,
    rsi_window: RollingWindow,
    k_window: RollingWindow,
    d_window: RollingWindow,
    outputs: [String; 2],
}

impl StochRsi {
    pub fn new(rsi: usize, stoch: usize, k: usize, d: usize) -> Self {
        assert!(rsi >= 1 && stoch >= 1 && k >= 1 && d >= 1, "StochRSI periods must be >= 1");
        Self {
            rsi_period: rsi,
            rsi: RsiState::new(rsi),
            rsi_window: RollingWindow::new(stoch),
            k_window: RollingWindow::new(k),
            d_window: RollingWindow::new(d),
            outputs: ["stoch_rsi_k".to_string(), "stoch_rsi_d".to_string()],
        }
    }
}

impl Indicator for StochRsi {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        // RSI warmup, then each window adds capacity - 1 candles
        self.rsi_period
            + self.rsi_window.capacity()
            + self.k_window.capacity()
            + self.d_window.capacity()
            - 3
    }

    fn reset(&mut self) {
        self.rsi.reset();
        self.rsi_window.clear();
        self.k_window.clear();
        self.d_window.clear();
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        let rsi = self.rsi.push(candle.close);
        if rsi.is_nan() || !self.rsi_window.push(rsi) {
            return vec![f64::NAN; 2];
        }
        let (lo, hi) = (self.rsi_window.min(), self.rsi_window.max());
        let raw = if hi > lo {
            100.0 * (rsi - lo) / (hi - lo)
        } else {
            50.0
        };
        if !self.k_window.push(raw) {
            return vec![f64::NAN; 2];
        }
        let k = self.k_window.mean();
        if !self.d_window.push(k) {
            return vec![k, f64::NAN];
        }
        vec![k, self.d_window.mean()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    #[test]
    fn stoch_rsi_warmup_boundaries() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
        let mut ind = StochRsi::new(14, 14, 3, 3);
        let out = ind.compute(&make_candles(&closes));
        assert!(out[0][28].is_nan());
        assert!(!out[0][29].is_nan());
        assert!(out[1][30].is_nan());
        assert!(!out[1][31].is_nan());
        assert_eq!(ind.lookback(), 31);
    }

    #[test]
    fn stoch_rsi_stays_in_range() {
        let closes: Vec<f64> = (0..120).map(|i| 50.0 + (i as f64 * 0.37).cos() * 4.0).collect();
        let out = StochRsi::new(14, 14, 3, 3).compute(&make_candles(&closes));
        for series in &out {
            for v in series.iter().filter(|v| !v.is_nan()) {
                assert!((0.0..=100.0).contains(v), "{v}");
            }
        }
    }
}
