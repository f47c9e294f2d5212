//! Ichimoku components (unshifted).
//!
//! tenkan = midpoint of the `tenkan` high/low range, kijun likewise over `kijun`,
//! senkou A = (tenkan + kijun) / 2, senkou B = midpoint over `senkou_b`.
//! Values are reported at the candle they are computed on; charting
//! conventions that plot the spans forward are left to consumers.

use super::{Indicator, RollingWindow};
use crate::domain::Candle;

#[derive(Debug, Clone)]
struct Midpoint {
    highs: RollingWindow,
    lows: RollingWindow,
}

impl Midpoint {
    fn new(period: usize) -> Self {
        Self {
            highs: RollingWindow::new(period),
            lows: RollingWindow::new(period),
        }
    }

    fn push(&mut self, candle: &Candle) -> f64 {
        self.highs.push(candle.high);
        if !self.lows.push(candle.low) {
            return f64::NAN;
        }
        (self.highs.max() + self.lows.min()) / 2.0
    }

    fn clear(&mut self) {
        self.highs.clear();
        self.lows.clear();
    }
}

#[derive(Debug, Clone)]
pub struct Ichimoku {
    tenkan: Midpoint,
    kijun: Midpoint,
    senkou_b: Midpoint,
    lookback: usize,
    outputs: [String; 4],
}

impl Ichimoku {
    pub fn new(tenkan: usize, kijun: usize, senkou_b: usize) -> Self {
        assert!(tenkan >= 1 && kijun >= 1 && senkou_b >= 1, "Ichimoku periods must be >= 1");
        Self {
            tenkan: Midpoint::new(tenkan),
            kijun: Midpoint::new(kijun),
            senkou_b: Midpoint::new(senkou_b),
            lookback: tenkan.max(kijun).max(senkou_b) - 1,
            outputs: [
                format!("tenkan_{tenkan}"),
                format!("kijun_{kijun}"),
                format!("senkou_a_{tenkan}_{kijun}"),
                format!("senkou_b_{senkou_b}"),
            ],
        }
    }
}

impl Indicator for Ichimoku {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.lookback
    }

    fn reset(&mut self) {
        self.tenkan.clear();
        self.kijun.clear();
        self.senkou_b.clear();
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        let tenkan = self.tenkan.push(candle);
        let kijun = self.kijun.push(candle);
        let senkou_b = self.senkou_b.push(candle);
        vec![tenkan, kijun, (tenkan + kijun) / 2.0, senkou_b]
    }
}
