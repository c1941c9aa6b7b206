//! Request window lengths (`"1 D"`, `"2 W"`, `"1800 S"`).

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::{DateTime, Duration, Months, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid duration {input:?}: {message}")]
pub struct DurationSpecError {
    pub input: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Seconds,
    Days,
    Weeks,
    /// Calendar months.
    Months,
    /// Calendar years.
    Years,
}

/// How far back a single request reaches from its end instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationSpec {
    amount: NonZeroU32,
    unit: DurationUnit,
}

impl DurationSpec {
    pub const fn new(amount: NonZeroU32, unit: DurationUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }

    pub const fn unit(&self) -> DurationUnit {
        self.unit
    }

    /// The inclusive start of a window of this length ending at `end`.
    ///
    /// Month and year lengths follow the calendar (clamping to the last day of
    /// shorter months). Returns `None` if the result is out of range.
    pub fn start_before(&self, end: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = self.amount.get();
        match self.unit {
            DurationUnit::Seconds => end.checked_sub_signed(Duration::seconds(i64::from(n))),
            DurationUnit::Days => end.checked_sub_signed(Duration::days(i64::from(n))),
            DurationUnit::Weeks => end.checked_sub_signed(Duration::weeks(i64::from(n))),
            DurationUnit::Months => end.checked_sub_months(Months::new(n)),
            DurationUnit::Years => end.checked_sub_months(Months::new(n.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = match self.unit {
            DurationUnit::Seconds => "S",
            DurationUnit::Days => "D",
            DurationUnit::Weeks => "W",
            DurationUnit::Months => "M",
            DurationUnit::Years => "Y",
        };
        write!(f, "{} {u}", self.amount)
    }
}

impl FromStr for DurationSpec {
    type Err = DurationSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |message: &str| DurationSpecError {
            input: s.to_string(),
            message: message.to_string(),
        };
        let input = s.trim();
        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| err("missing unit"))?;
        let (digits, unit) = input.split_at(split);
        let amount: u32 = digits.parse().map_err(|_| err("missing or invalid amount"))?;
        let amount = NonZeroU32::new(amount).ok_or_else(|| err("amount must be > 0"))?;
        let unit = match unit.trim().to_ascii_uppercase().as_str() {
            "S" => DurationUnit::Seconds,
            "D" => DurationUnit::Days,
            "W" => DurationUnit::Weeks,
            "M" => DurationUnit::Months,
            "Y" => DurationUnit::Years,
            _ => return Err(err("unit must be one of S, D, W, M, Y")),
        };
        Ok(Self::new(amount, unit))
    }
}
