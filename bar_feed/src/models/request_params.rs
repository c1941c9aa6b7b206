use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{contract::Contract, duration::DurationSpec, timeframe::Timeframe};

/// Which price stream the bars are built from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhatToShow {
    #[default]
    Trades,
    Midpoint,
    Bid,
    Ask,
    BidAsk,
    AdjustedLast,
}

impl fmt::Display for WhatToShow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WhatToShow::Trades => "TRADES",
            WhatToShow::Midpoint => "MIDPOINT",
            WhatToShow::Bid => "BID",
            WhatToShow::Ask => "ASK",
            WhatToShow::BidAsk => "BID_ASK",
            WhatToShow::AdjustedLast => "ADJUSTED_LAST",
        })
    }
}

/// The unit of historical pagination: bars of `timeframe` inside the
/// `duration` that ends at `end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub end: DateTime<Utc>,
    pub duration: DurationSpec,
    pub timeframe: Timeframe,
}

impl Window {
    /// Inclusive window start, `None` if it falls outside the representable range.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.duration.start_before(self.end)
    }
}

/// Parameters for one historical page request.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoricalRequest {
    pub contract: Contract,
    pub window: Window,
    pub what_to_show: WhatToShow,
    /// Restrict to regular trading hours.
    pub use_rth: bool,
}

/// Parameters for a live subscription: a short recent window that the feed
/// keeps refreshed.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveRequest {
    pub contract: Contract,
    pub timeframe: Timeframe,
    pub duration: DurationSpec,
    pub what_to_show: WhatToShow,
    pub use_rth: bool,
}

impl LiveRequest {
    /// The historical request covering this subscription's window as of `end`.
    pub fn window_ending(&self, end: DateTime<Utc>) -> HistoricalRequest {
        HistoricalRequest {
            contract: self.contract.clone(),
            window: Window {
                end,
                duration: self.duration,
                timeframe: self.timeframe,
            },
            what_to_show: self.what_to_show,
            use_rth: self.use_rth,
        }
    }
}
