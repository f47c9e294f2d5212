//! Tick → candle folding for one symbol and timeframe.

use chrono::{DateTime, Utc};

use crate::domain::{Candle, Tick, Timeframe};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregatorError {
    #[error("tick for {got} sent to the {expected} aggregator")]
    WrongSymbol { expected: String, got: String },
    #[error("tick at {tick} is older than the open candle at {current}")]
    OutOfOrder {
        current: DateTime<Utc>,
        tick: DateTime<Utc>,
    },
}

/// Folds ticks into OHLC candles.
///
/// Owns the single in-progress candle. A candle is sealed and returned by
/// the first tick that belongs to a later interval, before that tick is
/// folded into the next candle. Intervals with no ticks produce nothing.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    symbol: String,
    timeframe: Timeframe,
    current: Option<Candle>,
}

impl CandleAggregator {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            current: None,
        }
    }

    /// Fold a tick. Returns the candle it sealed, if any.
    pub fn push(&mut self, tick: &Tick) -> Result<Option<Candle>, AggregatorError> {
        if tick.symbol != self.symbol {
            return Err(AggregatorError::WrongSymbol {
                expected: self.symbol.clone(),
                got: tick.symbol.clone(),
            });
        }
        let bucket = self.timeframe.floor(tick.timestamp);
        let price = tick.price();

        match self.current.as_mut() {
            None => {
                self.current = Some(Candle::from_price(bucket, price));
                Ok(None)
            }
            Some(candle) if bucket == candle.open_time => {
                candle.high = candle.high.max(price);
                candle.low = candle.low.min(price);
                candle.close = price;
                candle.tick_count += 1;
                Ok(None)
            }
            Some(candle) if bucket > candle.open_time => {
                let sealed = std::mem::replace(candle, Candle::from_price(bucket, price));
                Ok(Some(sealed))
            }
            Some(candle) => Err(AggregatorError::OutOfOrder {
                current: candle.open_time,
                tick: tick.timestamp,
            }),
        }
    }

    /// The candle still accumulating ticks.
    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// Take the in-progress candle without emitting it as closed.
    pub fn flush(&mut self) -> Option<Candle> {
        self.current.take()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tick(m: u32, s: u32, bid: f64) -> Tick {
        Tick::new(
            "EURUSD",
            Utc.with_ymd_and_hms(2024, 3, 1, 9, m, s).unwrap(),
            bid,
            bid + 0.0002,
        )
    }

    #[test]
    fn same_interval_updates_ohlc() {
        let mut agg = CandleAggregator::new("EURUSD", Timeframe::M5);
        for (s, p) in [(0, 1.10), (10, 1.12), (20, 1.09), (30, 1.11)] {
            assert_eq!(agg.push(&tick(0, s, p)).unwrap(), None);
        }
        let c = agg.current().unwrap();
        assert_eq!(c.open, 1.10);
        assert_eq!(c.high, 1.12);
        assert_eq!(c.low, 1.09);
        assert_eq!(c.close, 1.11);
        assert_eq!(c.tick_count, 4);
    }

    #[test]
    fn next_interval_seals_previous_candle_first() {
        let mut agg = CandleAggregator::new("EURUSD", Timeframe::M5);
        agg.push(&tick(0, 0, 1.10)).unwrap();
        agg.push(&tick(4, 59, 1.11)).unwrap();
        let sealed = agg.push(&tick(5, 0, 1.20)).unwrap().expect("sealed candle");
        assert_eq!(sealed.close, 1.11);
        assert_eq!(sealed.high, 1.11);
        let next = agg.current().unwrap();
        assert_eq!(next.open, 1.20);
        assert_eq!(next.tick_count, 1);
    }

    #[test]
    fn empty_intervals_are_not_synthesized() {
        let mut agg = CandleAggregator::new("EURUSD", Timeframe::M1);
        agg.push(&tick(0, 0, 1.10)).unwrap();
        let sealed = agg.push(&tick(7, 0, 1.15)).unwrap().unwrap();
        assert_eq!(sealed.open_time.format("%M").to_string(), "00");
        assert_eq!(agg.current().unwrap().open_time.format("%M").to_string(), "07");
    }

    #[test]
    fn late_and_foreign_ticks_are_errors() {
        let mut agg = CandleAggregator::new("EURUSD", Timeframe::M5);
        agg.push(&tick(5, 0, 1.10)).unwrap();
        assert!(matches!(
            agg.push(&tick(4, 0, 1.10)),
            Err(AggregatorError::OutOfOrder { .. })
        ));
        let mut other = tick(5, 1, 1.10);
        other.symbol = "GBPUSD".into();
        assert!(matches!(
            agg.push(&other),
            Err(AggregatorError::WrongSymbol { .. })
        ));
        assert_eq!(agg.current().unwrap().tick_count, 1);
    }
}
