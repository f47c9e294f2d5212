//! Incrementally updated technical indicators.
//!
//! Every indicator consumes closed candles one at a time and appends exactly
//! one value per named output per candle, so all series stay index-parallel
//! with the `CandleSeries`. Values are `f64::NAN` until the indicator has
//! seen enough candles; a NaN input taints the indicator until `reset`.
//!
//! Multi-output indicators (MACD, Bollinger, Stochastic RSI, Ichimoku) expose
//! one named series per output.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod ichimoku;
pub mod macd;
pub mod momentum;
pub mod rsi;
pub mod stoch_rsi;

pub use atr::Atr;
pub use bollinger::Bollinger;
pub use ema::Ema;
pub use ichimoku::Ichimoku;
pub use macd::Macd;
pub use momentum::Momentum;
pub use rsi::Rsi;
pub use stoch_rsi::StochRsi;

use std::collections::{HashMap, VecDeque};

use crate::domain::Candle;

/// Series names of the standard indicator set.
pub mod names {
    pub const EMA_10: &str = "ema_10";
    pub const EMA_20: &str = "ema_20";
    pub const EMA_50: &str = "ema_50";
    pub const EMA_200: &str = "ema_200";
    pub const RSI_14: &str = "rsi_14";
    pub const MACD: &str = "macd_12_26_9";
    pub const MACD_SIGNAL: &str = "macd_signal_12_26_9";
    pub const MACD_HIST: &str = "macd_hist_12_26_9";
    pub const ATR_14: &str = "atr_14";
    pub const MOMENTUM_10: &str = "momentum_10";
    pub const BB_UPPER: &str = "bb_upper_20_2";
    pub const BB_MIDDLE: &str = "bb_middle_20_2";
    pub const BB_LOWER: &str = "bb_lower_20_2";
    pub const STOCH_RSI_K: &str = "stoch_rsi_k";
    pub const STOCH_RSI_D: &str = "stoch_rsi_d";
}

/// Trait for incremental indicators.
///
/// # Look-ahead guard
/// The value appended for candle `t` may depend only on candles `0..=t`.
pub trait Indicator: Send + Sync {
    /// Output series names, in the order `update` returns values.
    fn outputs(&self) -> &[String];

    /// Index of the first candle at which every output is defined.
    fn lookback(&self) -> usize;

    /// Forget all state.
    fn reset(&mut self);

    /// Consume one closed candle; returns one value per output.
    fn update(&mut self, candle: &Candle) -> Vec<f64>;

    /// Reset, then fold the whole series. Returns one series per output.
    fn compute(&mut self, candles: &[Candle]) -> Vec<Vec<f64>> {
        self.reset();
        let mut out = vec![Vec::with_capacity(candles.len()); self.outputs().len()];
        for candle in candles {
            for (series, value) in out.iter_mut().zip(self.update(candle)) {
                series.push(value);
            }
        }
        out
    }
}

/// Declarative indicator request, used to deduplicate the engine's set.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorSpec {
    Ema(usize),
    Rsi(usize),
    Macd { fast: usize, slow: usize, signal: usize },
    Atr(usize),
    Bollinger { period: usize, k: f64 },
    StochRsi { rsi: usize, stoch: usize, k: usize, d: usize },
    Momentum(usize),
    Ichimoku { tenkan: usize, kijun: usize, senkou_b: usize },
}

impl IndicatorSpec {
    pub fn build(&self) -> Box<dyn Indicator> {
        match *self {
            IndicatorSpec::Ema(p) => Box::new(Ema::new(p)),
            IndicatorSpec::Rsi(p) => Box::new(Rsi::new(p)),
            IndicatorSpec::Macd { fast, slow, signal } => Box::new(Macd::new(fast, slow, signal)),
            IndicatorSpec::Atr(p) => Box::new(Atr::new(p)),
            IndicatorSpec::Bollinger { period, k } => Box::new(Bollinger::new(period, k)),
            IndicatorSpec::StochRsi { rsi, stoch, k, d } => {
                Box::new(StochRsi::new(rsi, stoch, k, d))
            }
            IndicatorSpec::Momentum(p) => Box::new(Momentum::new(p)),
            IndicatorSpec::Ichimoku {
                tenkan,
                kijun,
                senkou_b,
            } => Box::new(Ichimoku::new(tenkan, kijun, senkou_b)),
        }
    }

    /// The set every engine carries: trend EMAs, RSI, MACD, ATR, Bollinger,
    /// Stochastic RSI, momentum and Ichimoku.
    pub fn standard() -> Vec<IndicatorSpec> {
        vec![
            IndicatorSpec::Ema(10),
            IndicatorSpec::Ema(20),
            IndicatorSpec::Ema(50),
            IndicatorSpec::Ema(200),
            IndicatorSpec::Rsi(14),
            IndicatorSpec::Macd {
                fast: 12,
                slow: 26,
                signal: 9,
            },
            IndicatorSpec::Atr(14),
            IndicatorSpec::Bollinger { period: 20, k: 2.0 },
            IndicatorSpec::StochRsi {
                rsi: 14,
                stoch: 14,
                k: 3,
                d: 3,
            },
            IndicatorSpec::Momentum(10),
            IndicatorSpec::Ichimoku {
                tenkan: 9,
                kijun: 26,
                senkou_b: 52,
            },
        ]
    }
}

/// Indicator series, index-parallel to the candle series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a named series.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Append one value to a named series.
    pub fn push(&mut self, name: &str, value: f64) {
        match self.series.get_mut(name) {
            Some(values) => values.push(value),
            None => {
                self.series.insert(name.to_string(), vec![value]);
            }
        }
    }

    /// Defined value at `index`. `None` when unknown, out of range, or warming up.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(index).copied())
            .filter(|v| !v.is_nan())
    }

    /// Defined value at the most recent index.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.last().copied())
            .filter(|v| !v.is_nan())
    }

    /// Full series including warmup NaNs.
    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(|k| k.as_str())
    }

    /// Number of series stored.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Owns the indicator set and its appended values.
pub struct IndicatorEngine {
    indicators: Vec<Box<dyn Indicator>>,
    values: IndicatorValues,
    candles_seen: usize,
}

impl IndicatorEngine {
    /// Build from specs, skipping any whose outputs are already covered.
    pub fn new(specs: &[IndicatorSpec]) -> Self {
        let mut engine = Self {
            indicators: Vec::new(),
            values: IndicatorValues::new(),
            candles_seen: 0,
        };
        for spec in specs {
            engine.add(spec);
        }
        engine
    }

    pub fn standard() -> Self {
        Self::new(&IndicatorSpec::standard())
    }

    /// Register an indicator. Returns false if its outputs already exist.
    ///
    /// Indicators added after candles were consumed are back-filled on the
    /// next `recompute`.
    pub fn add(&mut self, spec: &IndicatorSpec) -> bool {
        let indicator = spec.build();
        let taken = indicator
            .outputs()
            .iter()
            .any(|name| self.output_names().any(|existing| existing == name));
        if taken {
            return false;
        }
        self.indicators.push(indicator);
        true
    }

    fn output_names(&self) -> impl Iterator<Item = &String> {
        self.indicators.iter().flat_map(|i| i.outputs().iter())
    }

    /// Append the values for one newly closed candle.
    pub fn on_candle(&mut self, candle: &Candle) {
        for indicator in self.indicators.iter_mut() {
            let row = indicator.update(candle);
            for (name, value) in indicator.outputs().iter().zip(row) {
                self.values.push(name, value);
            }
        }
        self.candles_seen += 1;
    }

    /// Reset every indicator and refold `candles` from scratch.
    pub fn recompute(&mut self, candles: &[Candle]) {
        let mut values = IndicatorValues::new();
        for indicator in self.indicators.iter_mut() {
            let columns = indicator.compute(candles);
            for (name, column) in indicator.outputs().iter().zip(columns) {
                values.insert(name.clone(), column);
            }
        }
        self.values = values;
        self.candles_seen = candles.len();
    }

    pub fn values(&self) -> &IndicatorValues {
        &self.values
    }

    /// Number of candles folded so far.
    pub fn len(&self) -> usize {
        self.candles_seen
    }

    pub fn is_empty(&self) -> bool {
        self.candles_seen == 0
    }

    /// Largest warmup of any registered indicator.
    pub fn max_lookback(&self) -> usize {
        self.indicators.iter().map(|i| i.lookback()).max().unwrap_or(0)
    }
}

/// Fixed-capacity window over the most recent values.
#[derive(Debug, Clone)]
pub(crate) struct RollingWindow {
    capacity: usize,
    buf: VecDeque<f64>,
}

impl RollingWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Push a value; returns true once the window is full.
    pub(crate) fn push(&mut self, value: f64) -> bool {
        self.buf.push_back(value);
        if self.buf.len() > self.capacity {
            self.buf.pop_front();
        }
        self.is_full()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn is_full(&self) -> bool {
        self.buf.len() == self.capacity
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    pub(crate) fn front(&self) -> Option<f64> {
        self.buf.front().copied()
    }

    pub(crate) fn mean(&self) -> f64 {
        self.buf.iter().sum::<f64>() / self.buf.len() as f64
    }

    pub(crate) fn max(&self) -> f64 {
        self.buf.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub(crate) fn min(&self) -> f64 {
        self.buf.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &f64> {
        self.buf.iter()
    }
}

/// Synthetic candles from close prices for testing.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                open_time: base + chrono::Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                tick_count: 1,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        make_candles(&closes)
    }

    #[test]
    fn get_hides_warmup_nan() {
        let mut iv = IndicatorValues::new();
        iv.insert("ema_3", vec![f64::NAN, f64::NAN, 11.0]);
        assert_eq!(iv.get("ema_3", 0), None);
        assert_eq!(iv.get("ema_3", 2), Some(11.0));
        assert_eq!(iv.get("ema_3", 3), None);
        assert_eq!(iv.get("missing", 0), None);
        assert_eq!(iv.latest("ema_3"), Some(11.0));
    }

    #[test]
    fn series_stay_index_parallel() {
        let candles = ramp(60);
        let mut engine = IndicatorEngine::standard();
        for c in &candles {
            engine.on_candle(c);
        }
        assert_eq!(engine.len(), 60);
        for name in engine.values().names() {
            assert_eq!(engine.values().get_series(name).unwrap().len(), 60, "{name}");
        }
    }

    #[test]
    fn incremental_matches_recompute() {
        let candles = ramp(250);
        let mut incremental = IndicatorEngine::standard();
        for c in &candles {
            incremental.on_candle(c);
        }
        let mut batch = IndicatorEngine::standard();
        batch.recompute(&candles);
        for name in incremental.values().names() {
            let a = incremental.values().get_series(name).unwrap();
            let b = batch.values().get_series(name).unwrap();
            for (x, y) in a.iter().zip(b) {
                assert!(x.to_bits() == y.to_bits() || (x - y).abs() < 1e-12, "{name}");
            }
        }
    }

    #[test]
    fn duplicate_specs_are_skipped() {
        let mut engine = IndicatorEngine::standard();
        assert!(!engine.add(&IndicatorSpec::Ema(50)));
        assert!(engine.add(&IndicatorSpec::Ema(21)));
        engine.on_candle(&ramp(1)[0]);
        assert!(engine.values().get_series("ema_21").is_some());
    }

    #[test]
    fn standard_set_defines_nothing_before_lookback() {
        let candles = ramp(30);
        let mut engine = IndicatorEngine::standard();
        engine.recompute(&candles);
        let v = engine.values();
        assert_eq!(v.get(names::EMA_50, 29), None);
        assert_eq!(v.get(names::RSI_14, 13), None);
        assert!(v.get(names::RSI_14, 14).is_some());
        assert_eq!(v.get(names::MACD, 24), None);
        assert!(v.get(names::MACD, 25).is_some());
        assert_eq!(engine.max_lookback(), 199);
    }

    #[test]
    fn rolling_window_evicts_oldest() {
        let mut w = RollingWindow::new(3);
        assert!(!w.push(1.0));
        assert!(!w.push(2.0));
        assert!(w.push(3.0));
        assert!(w.push(4.0));
        assert_eq!(w.front(), Some(2.0));
        assert_eq!(w.mean(), 3.0);
        assert_eq!(w.max(), 4.0);
        assert_eq!(w.min(), 2.0);
    }
}
