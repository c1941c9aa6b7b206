//! Bar representations on both sides of normalization.
//!
//! [`RawBar`] is what a provider hands back: a provider-native timestamp and
//! whatever OHLCV fields it chose to fill. [`Bar`] is the persisted shape,
//! produced by [`crate::normalize::normalize_bar`], with a UTC timestamp and
//! the owning [`SeriesKey`].
//!
//! Missing numeric fields stay `None` on both sides. They are never coerced
//! to zero, since a zero volume or price corrupts downstream aggregations.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::models::series::SeriesKey;

/// A timestamp exactly as the provider supplied it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    /// Text to be parsed (RFC-3339, ISO-8601, `YYYYMMDD HH:MM:SS [Zone]`, ...).
    Text(String),
    /// An instant with an explicit offset.
    Offset(DateTime<FixedOffset>),
    /// An instant already in UTC.
    Utc(DateTime<Utc>),
    /// A wall-clock time without zone information; read as UTC.
    Naive(NaiveDateTime),
    /// A calendar date (daily and coarser bars); read as midnight UTC.
    Date(NaiveDate),
    /// Seconds since the Unix epoch.
    EpochSeconds(i64),
}

impl From<&str> for RawTimestamp {
    fn from(s: &str) -> Self {
        RawTimestamp::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        RawTimestamp::Utc(dt)
    }
}

/// A single bar as returned by a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub timestamp: RawTimestamp,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    /// Volume-weighted average price. Not all providers supply this.
    pub wap: Option<f64>,
    /// Trade count for the bar. Not all providers supply this.
    pub bar_count: Option<i64>,
}

impl RawBar {
    /// A bar with only a timestamp; fields are filled in with the builder-style setters.
    pub fn at(timestamp: impl Into<RawTimestamp>) -> Self {
        Self {
            timestamp: timestamp.into(),
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            wap: None,
            bar_count: None,
        }
    }

    pub fn with_ohlc(mut self, open: f64, high: f64, low: f64, close: f64) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self.close = Some(close);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// A normalized bar, ready to persist.
///
/// The store's uniqueness key is `(series.symbol, series.timeframe, timestamp)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub series: Arc<SeriesKey>,
    /// Start of the bar interval, UTC.
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub wap: Option<f64>,
    pub bar_count: Option<i64>,
    /// Provider tag, e.g. `"alpaca"`.
    pub source: String,
}
