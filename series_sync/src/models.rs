//! Diesel models mapping to [`crate::schema::market_bars`].

use bar_feed::models::bar::Bar;
use diesel::prelude::*;

use crate::{schema::market_bars, tz};

/// Insertable form of a normalized [`Bar`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = market_bars)]
pub struct NewMarketBar<'a> {
    /// Symbol identifier (e.g., "AAPL").
    pub symbol: &'a str,
    /// Canonical timeframe label (e.g., "1 min").
    pub timeframe: String,
    /// Bar start in RFC-3339 UTC, millisecond precision.
    pub ts: String,
    /// Opening price.
    pub open: Option<f64>,
    /// High price.
    pub high: Option<f64>,
    /// Low price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume.
    pub volume: Option<f64>,
    /// Volume-weighted average price.
    pub wap: Option<f64>,
    /// Number of trades in the bar.
    pub bar_count: Option<i64>,
    /// Provider tag.
    pub source: &'a str,
}

impl<'a> From<&'a Bar> for NewMarketBar<'a> {
    fn from(bar: &'a Bar) -> Self {
        Self {
            symbol: bar.series.symbol(),
            timeframe: bar.series.timeframe().to_string(),
            ts: tz::to_rfc3339_millis(bar.timestamp),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            wap: bar.wap,
            bar_count: bar.bar_count,
            source: &bar.source,
        }
    }
}

/// A row in [`crate::schema::market_bars`].
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = market_bars, check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketBarRow {
    /// Symbol identifier.
    pub symbol: String,
    /// Canonical timeframe label.
    pub timeframe: String,
    /// Bar start in RFC-3339 UTC.
    pub ts: String,
    /// Opening price.
    pub open: Option<f64>,
    /// High price.
    pub high: Option<f64>,
    /// Low price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume.
    pub volume: Option<f64>,
    /// Volume-weighted average price.
    pub wap: Option<f64>,
    /// Number of trades in the bar.
    pub bar_count: Option<i64>,
    /// Provider tag.
    pub source: String,
}
