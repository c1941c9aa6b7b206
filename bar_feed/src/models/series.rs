//! Identity of one logical bar series.

use std::fmt;

use crate::models::timeframe::Timeframe;

/// `(symbol, timeframe)`: the scope for deduplication and resume planning.
///
/// Immutable once built; pipelines share it behind an `Arc` for the lifetime
/// of one symbol's processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    symbol: String,
    timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.timeframe)
    }
}
