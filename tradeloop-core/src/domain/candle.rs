//! Candles, timeframes, and the append-only candle series.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Interval length in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 5 * 60,
            Timeframe::M15 => 15 * 60,
            Timeframe::M30 => 30 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => 24 * 60 * 60,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Start of the interval containing `ts` (UTC, epoch-aligned).
    pub fn floor(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(self.seconds());
        DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(ts)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        };
        f.write_str(s)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "M30" => Ok(Timeframe::M30),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe: {other}")),
        }
    }
}

/// OHLC summary of one interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_count: u32,
}

impl Candle {
    /// A fresh candle seeded by a single price.
    pub fn from_price(open_time: DateTime<Utc>, price: f64) -> Self {
        Self {
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            tick_count: 1,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Run of intervals with no ticks, recorded instead of synthesizing candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapMarker {
    /// Index of the last candle before the gap.
    pub after_index: usize,
    /// Open time of the first missing interval.
    pub from: DateTime<Utc>,
    /// Open time of the candle that ended the gap.
    pub to: DateTime<Utc>,
    /// Number of missing intervals.
    pub missing: i64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("candle at {got} does not follow last candle at {last}")]
    NotIncreasing {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// Ordered, append-only candle history.
///
/// Open times are strictly increasing. Intervals without ticks are not
/// filled; each hole is recorded as a [`GapMarker`].
#[derive(Debug, Clone)]
pub struct CandleSeries {
    timeframe: Timeframe,
    candles: Vec<Candle>,
    gaps: Vec<GapMarker>,
}

impl CandleSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candles: Vec::new(),
            gaps: Vec::new(),
        }
    }

    /// Append a closed candle. Returns the gap marker if intervals were skipped.
    pub fn push(&mut self, candle: Candle) -> Result<Option<GapMarker>, SeriesError> {
        let mut gap = None;
        if let Some(last) = self.candles.last() {
            if candle.open_time <= last.open_time {
                return Err(SeriesError::NotIncreasing {
                    last: last.open_time,
                    got: candle.open_time,
                });
            }
            let step = self.timeframe.seconds();
            let elapsed = (candle.open_time - last.open_time).num_seconds();
            let missing = elapsed / step - 1;
            if missing > 0 {
                let marker = GapMarker {
                    after_index: self.candles.len() - 1,
                    from: last.open_time + self.timeframe.duration(),
                    to: candle.open_time,
                    missing,
                };
                self.gaps.push(marker.clone());
                gap = Some(marker);
            }
        }
        self.candles.push(candle);
        Ok(gap)
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn gaps(&self) -> &[GapMarker] {
        &self.gaps
    }
}
