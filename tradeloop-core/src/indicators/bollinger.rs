//! Bollinger Bands.
//!
//! middle = SMA(period); upper/lower = middle ± k * population stddev(period).
//! Lookback: period - 1.

use super::{Indicator, RollingWindow};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Bollinger {
    k: f64,
    window: RollingWindow,
    period: usize,
    tainted: bool,
    outputs: [String; 3],
}

impl Bollinger {
    pub fn new(period: usize, k: f64) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self {
            k,
            window: RollingWindow::new(period),
            period,
            tainted: false,
            outputs: [
                format!("bb_upper_{period}_{k}"),
                format!("bb_middle_{period}_{k}"),
                format!("bb_lower_{period}_{k}"),
            ],
        }
    }
}

impl Indicator for Bollinger {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn reset(&mut self) {
        self.window.clear();
        self.tainted = false;
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        if self.tainted || candle.close.is_nan() {
            self.tainted = true;
            return vec![f64::NAN; 3];
        }
        if !self.window.push(candle.close) {
            return vec![f64::NAN; 3];
        }
        let mean = self.window.mean();
        let var = self.window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / self.period as f64;
        let band = self.k * var.sqrt();
        vec![mean + band, mean, mean - band]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn bollinger_known_values() {
        // closes 2,4,4,4,5,5,7,9: mean 5, population stddev 2
        let candles = make_candles(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let out = Bollinger::new(8, 2.0).compute(&candles);
        assert!(out[0][6].is_nan());
        assert_approx(out[1][7], 5.0, DEFAULT_EPSILON);
        assert_approx(out[0][7], 9.0, DEFAULT_EPSILON);
        assert_approx(out[2][7], 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bollinger_names_format_multiplier() {
        let b = Bollinger::new(20, 2.0);
        assert_eq!(b.outputs()[0], "bb_upper_20_2");
        let b = Bollinger::new(20, 2.5);
        assert_eq!(b.outputs()[2], "bb_lower_20_2.5");
    }
}
