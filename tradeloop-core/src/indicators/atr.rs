//! Average True Range (ATR).
//!
//! True Range = max(high - low, |high - prev_close|, |low - prev_close|).
//! The first candle has no previous close and contributes no true range.
//! ATR is the Wilder-smoothed true range. Lookback: period.

use super::rsi::WilderState;
use super::Indicator;
use crate::domain::Candle;

/// True range for a candle given the previous close.
pub fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    let hl = candle.high - candle.low;
    let hc = (candle.high - prev_close).abs();
    let lc = (candle.low - prev_close).abs();
    hl.max(hc).max(lc)
}

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    smoother: WilderState,
    tainted: bool,
    outputs: [String; 1],
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            prev_close: None,
            smoother: WilderState::new(period),
            tainted: false,
            outputs: [format!("atr_{period}")],
        }
    }
}

impl Indicator for Atr {
    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.smoother.reset();
        self.tainted = false;
    }

    fn update(&mut self, candle: &Candle) -> Vec<f64> {
        if self.tainted {
            return vec![f64::NAN];
        }
        if candle.high.is_nan() || candle.low.is_nan() || candle.close.is_nan() {
            self.tainted = true;
            return vec![f64::NAN];
        }
        let Some(prev_close) = self.prev_close.replace(candle.close) else {
            return vec![f64::NAN];
        };
        vec![self.smoother.push(true_range(candle, prev_close))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn true_range_uses_gap_from_previous_close() {
        let mut c = make_candles(&[10.0])[0].clone();
        c.high = 12.0;
        c.low = 11.0;
        assert_approx(true_range(&c, 8.0), 4.0, DEFAULT_EPSILON);
        assert_approx(true_range(&c, 11.5), 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_constant_range() {
        // make_candles with a flat close: high - low = 2 on every candle
        let candles = make_candles(&[100.0; 8]);
        let result = Atr::new(3).compute(&candles).remove(0);
        assert!(result[..3].iter().all(|v| v.is_nan()));
        for v in &result[3..] {
            assert_approx(*v, 2.0, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn atr_lookback() {
        assert_eq!(Atr::new(14).lookback(), 14);
    }
}
