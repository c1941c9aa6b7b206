//! Timestamp text as stored in the database.
//!
//! Every `ts` column holds RFC-3339 UTC with exactly three fractional digits
//! and a `Z` suffix (`2024-01-02T14:30:00.000Z`). Fixed width means SQLite's
//! text ordering and `MAX(ts)` agree with time ordering.
//!
//! Millisecond precision is enough for the key: the finest bar width is one
//! second, so two distinct bars of a series never share a millisecond.

use chrono::{DateTime, ParseError, SecondsFormat, Utc};

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> Result<DateTime<Utc>, ParseError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
