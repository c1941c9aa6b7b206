//! Bar granularity.
//!
//! A [`Timeframe`] pairs a non-zero amount with a [`TimeframeUnit`]. Only
//! fixed-width units are modelled: every bar of a series spans exactly
//! [`Timeframe::bar_duration`], which is what resume planning relies on.
//! Calendar months are rejected at parse time.
//!
//! Two spellings are accepted when parsing:
//! - provider style: `"1 min"`, `"5 mins"`, `"1 hour"`, `"1 day"`, `"30 secs"`
//! - compact style: `"1m"`, `"5m"`, `"1h"`, `"1D"`, `"1W"`, `"30s"`
//!
//! [`Display`](fmt::Display) always renders the provider style, which is also
//! the label persisted with every row, so `"1m"` and `"1 min"` name the same
//! series.
//!
//! ```
//! use bar_feed::models::timeframe::{Timeframe, TimeframeUnit};
//!
//! let tf: Timeframe = "5m".parse().unwrap();
//! assert_eq!(tf.unit(), TimeframeUnit::Minute);
//! assert_eq!(tf.to_string(), "5 mins");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::Duration;
use nonzero_ext::nonzero;
use thiserror::Error;

use crate::models::duration::{DurationSpec, DurationUnit};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("Invalid timeframe {input:?}: {message}")]
    InvalidInput { input: String, message: String },

    #[error("Unsupported timeframe {input:?}: {message}")]
    Unsupported { input: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    Second,
    Minute,
    Hour,
    Day,
    /// Seven UTC days.
    Week,
}

impl TimeframeUnit {
    const fn seconds(self) -> i64 {
        match self {
            TimeframeUnit::Second => 1,
            TimeframeUnit::Minute => 60,
            TimeframeUnit::Hour => 60 * 60,
            TimeframeUnit::Day => 24 * 60 * 60,
            TimeframeUnit::Week => 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    amount: NonZeroU32,
    unit: TimeframeUnit,
}

impl Timeframe {
    pub const fn new(amount: NonZeroU32, unit: TimeframeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn minutes(amount: u32) -> Result<Self, TimeframeError> {
        let amount = NonZeroU32::new(amount).ok_or_else(|| TimeframeError::InvalidInput {
            input: amount.to_string(),
            message: "amount must be > 0".into(),
        })?;
        Ok(Self::new(amount, TimeframeUnit::Minute))
    }

    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }

    pub const fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    /// Width of one bar.
    pub fn bar_duration(&self) -> Duration {
        Duration::seconds(self.unit.seconds() * i64::from(self.amount.get()))
    }

    /// Bars shorter than a day carry a wall-clock time that session filters care about.
    pub fn is_intraday(&self) -> bool {
        self.bar_duration() < Duration::days(1)
    }

    /// Largest request window that stays inside typical per-request limits
    /// for this granularity.
    pub fn default_page_duration(&self) -> DurationSpec {
        let secs = self.bar_duration().num_seconds();
        if secs < 60 {
            DurationSpec::new(nonzero!(1800u32), DurationUnit::Seconds)
        } else if secs <= 60 {
            DurationSpec::new(nonzero!(1u32), DurationUnit::Days)
        } else if secs <= 30 * 60 {
            DurationSpec::new(nonzero!(1u32), DurationUnit::Weeks)
        } else if secs < 24 * 60 * 60 {
            DurationSpec::new(nonzero!(1u32), DurationUnit::Months)
        } else {
            DurationSpec::new(nonzero!(1u32), DurationUnit::Years)
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = self.amount.get();
        let u = match (self.unit, a) {
            (TimeframeUnit::Second, _) => "secs",
            (TimeframeUnit::Minute, 1) => "min",
            (TimeframeUnit::Minute, _) => "mins",
            (TimeframeUnit::Hour, 1) => "hour",
            (TimeframeUnit::Hour, _) => "hours",
            (TimeframeUnit::Day, 1) => "day",
            (TimeframeUnit::Day, _) => "days",
            (TimeframeUnit::Week, 1) => "week",
            (TimeframeUnit::Week, _) => "weeks",
        };
        write!(f, "{a} {u}")
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |message: &str| TimeframeError::InvalidInput {
            input: s.to_string(),
            message: message.to_string(),
        };

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| invalid("missing unit"))?;
        let (digits, unit) = input.split_at(split);
        if digits.is_empty() {
            return Err(invalid("missing amount"));
        }
        let amount_num: u32 = digits.parse().map_err(|_| invalid("amount out of range"))?;
        let amount = NonZeroU32::new(amount_num).ok_or_else(|| invalid("amount must be > 0"))?;

        let unit = unit.trim();
        let month = || TimeframeError::Unsupported {
            input: s.to_string(),
            message: "month bars have no fixed duration".into(),
        };
        // "M" is month in compact form, "m" is minute.
        if unit == "M" {
            return Err(month());
        }
        let unit = match unit.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => TimeframeUnit::Second,
            "m" | "min" | "mins" | "minute" | "minutes" => TimeframeUnit::Minute,
            "h" | "hour" | "hours" => TimeframeUnit::Hour,
            "d" | "day" | "days" => TimeframeUnit::Day,
            "w" | "week" | "weeks" => TimeframeUnit::Week,
            "mo" | "month" | "months" => return Err(month()),
            _ => return Err(invalid("unknown unit")),
        };
        Ok(Timeframe::new(amount, unit))
    }
}
