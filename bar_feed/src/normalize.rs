//! Provider timestamps to canonical UTC instants.
//!
//! What this module provides:
//! - [`normalize`]: any [`RawTimestamp`] to `DateTime<Utc>`.
//! - [`parse_text`]: the text forms providers actually send.
//! - [`normalize_bar`]: a [`RawBar`] to a persisted [`Bar`].
//!
//! Input that carries no zone information is taken to be UTC, never local
//! time. The only exception is text with a trailing IANA zone name
//! (`20240102 09:30:00 America/New_York`), which is resolved strictly: wall
//! times that are skipped or repeated by a DST transition are rejected.
//!
//! Accepted text forms:
//! - RFC-3339: `2024-03-10T09:30:00-05:00`, `2024-03-10T14:30:00.123Z`
//! - ISO-8601 with a space separator and offset: `2024-03-10 14:30:00+00:00`
//! - naive date-time: `2024-03-10T14:30:00`, `2024-03-10 14:30`, `20240310 14:30:00`
//! - date only: `2024-03-10`, `20240310`
//! - epoch seconds: `1710081000`

use std::sync::Arc;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::models::{
    bar::{Bar, RawBar, RawTimestamp},
    series::SeriesKey,
};

/// The input could not be turned into an instant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Malformed timestamp {input:?}: {reason}")]
pub struct MalformedTimestamp {
    /// The offending value as text.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl MalformedTimestamp {
    fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%d %H:%M:%S",
    "%Y%m%d-%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

/// Converts a provider timestamp to UTC.
pub fn normalize(raw: &RawTimestamp) -> Result<DateTime<Utc>, MalformedTimestamp> {
    match raw {
        RawTimestamp::Text(s) => parse_text(s),
        RawTimestamp::Offset(dt) => Ok(dt.with_timezone(&Utc)),
        RawTimestamp::Utc(dt) => Ok(*dt),
        RawTimestamp::Naive(naive) => Ok(naive.and_utc()),
        RawTimestamp::Date(date) => midnight_utc(*date, &date.to_string()),
        RawTimestamp::EpochSeconds(secs) => DateTime::from_timestamp(*secs, 0)
            .ok_or_else(|| MalformedTimestamp::new(secs.to_string(), "epoch seconds out of range")),
    }
}

/// Parses a textual timestamp to UTC.
pub fn parse_text(input: &str) -> Result<DateTime<Utc>, MalformedTimestamp> {
    // Providers pad fields with runs of spaces ("20240102  09:30:00").
    let s = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.is_empty() {
        return Err(MalformedTimestamp::new(input, "empty input"));
    }

    let digits_only = s.bytes().all(|b| b.is_ascii_digit());
    if digits_only && s.len() != 8 {
        let secs: i64 = s
            .parse()
            .map_err(|_| MalformedTimestamp::new(input, "epoch seconds out of range"))?;
        return normalize(&RawTimestamp::EpochSeconds(secs))
            .map_err(|e| MalformedTimestamp::new(input, e.reason));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&s, fmt) {
            return midnight_utc(date, input);
        }
    }
    if let Some(dt) = parse_with_zone_name(&s, input)? {
        return Ok(dt);
    }

    Err(MalformedTimestamp::new(input, "unrecognized format"))
}

/// `<date> <time> <IANA zone>`; `Ok(None)` when the last token is not a zone.
fn parse_with_zone_name(
    s: &str,
    input: &str,
) -> Result<Option<DateTime<Utc>>, MalformedTimestamp> {
    let Some((local, zone)) = s.rsplit_once(' ') else {
        return Ok(None);
    };
    let Ok(tz) = zone.parse::<Tz>() else {
        return Ok(None);
    };
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok())
        .ok_or_else(|| MalformedTimestamp::new(input, "unrecognized wall-clock time"))?;

    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(Some(dt.with_timezone(&Utc))),
        LocalResult::Ambiguous(..) => Err(MalformedTimestamp::new(input, "ambiguous local time")),
        LocalResult::None => Err(MalformedTimestamp::new(input, "nonexistent local time")),
    }
}

fn midnight_utc(date: NaiveDate, input: &str) -> Result<DateTime<Utc>, MalformedTimestamp> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MalformedTimestamp::new(input, "invalid date"))
}

/// Converts a provider bar into the persisted row shape for `series`.
pub fn normalize_bar(
    series: &Arc<SeriesKey>,
    raw: &RawBar,
    source: &str,
) -> Result<Bar, MalformedTimestamp> {
    Ok(Bar {
        series: Arc::clone(series),
        timestamp: normalize(&raw.timestamp)?,
        open: raw.open,
        high: raw.high,
        low: raw.low,
        close: raw.close,
        volume: raw.volume,
        wap: raw.wap,
        bar_count: raw.bar_count,
        source: source.to_string(),
    })
}
