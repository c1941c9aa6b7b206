//! Where a backfill resumes.
//!
//! The boundary is recomputed from persisted state on every run, so a crash
//! mid-backfill needs no checkpoint of its own.

use chrono::{DateTime, Duration, Utc};

/// Inputs and result of one resume computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeDecision {
    /// Earliest bar the configuration asks for.
    pub configured_start: DateTime<Utc>,
    /// Latest persisted bar start, if any.
    pub last_persisted: Option<DateTime<Utc>>,
    /// First bar start that still has to be fetched.
    pub effective_start: DateTime<Utc>,
}

impl ResumeDecision {
    /// Computes the decision for one series.
    pub fn new(
        configured_start: DateTime<Utc>,
        last_persisted: Option<DateTime<Utc>>,
        bar_duration: Duration,
    ) -> Self {
        Self {
            configured_start,
            last_persisted,
            effective_start: plan(configured_start, last_persisted, bar_duration),
        }
    }

    /// True when data already exists and the resume point moved past the configured start.
    pub fn is_resume(&self) -> bool {
        self.effective_start > self.configured_start
    }
}

/// `max(configured_start, last_persisted + bar_duration)`, or
/// `configured_start` when nothing is persisted.
///
/// Saturates at the largest representable instant.
pub fn plan(
    configured_start: DateTime<Utc>,
    last_persisted: Option<DateTime<Utc>>,
    bar_duration: Duration,
) -> DateTime<Utc> {
    match last_persisted {
        None => configured_start,
        Some(last) => {
            let next = last
                .checked_add_signed(bar_duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            next.max(configured_start)
        }
    }
}
