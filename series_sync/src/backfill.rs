//! Backward-walking historical pagination.
//!
//! [`BackfillPaginator::run`] starts with a cursor at "now" and repeatedly asks
//! the source for the window `[cursor - page_duration, cursor)`:
//!
//! - a non-empty page is normalized and written as one batch, then the cursor
//!   moves to the earliest bar start in the page or the window start,
//!   whichever is older;
//! - an empty page moves the cursor back by at least the window and at least
//!   one probe unit (a calendar day), so weekends, holidays and the time
//!   before a listing are skipped.
//!
//! The walk stops once the cursor is at or before the resume boundary. Every
//! next cursor is at or before the start of the window just fetched, so
//! consecutive windows never overlap and a source that keeps returning the
//! same page cannot stall the loop. A request cap bounds the total number of
//! fetches. Sources must return the whole window (see
//! [`HistoricalSource::fetch_bars`]).
//!
//! Rows older than the boundary that arrive in the final page are still
//! written; the store ignores any it already holds.

use std::{fmt, sync::Arc};

use bar_feed::{
    models::{
        bar::Bar,
        contract::Contract,
        duration::DurationSpec,
        request_params::{HistoricalRequest, WhatToShow, Window},
        series::SeriesKey,
        timeframe::Timeframe,
    },
    normalize::{MalformedTimestamp, normalize_bar},
    providers::{HistoricalSource, ProviderError},
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{store::StoreError, writer::SeriesWriter};

/// Default request cap per series.
pub const DEFAULT_MAX_PAGES: usize = 5000;

/// Knobs for one series' backfill.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillConfig {
    /// Length of each requested window.
    pub page_duration: DurationSpec,
    /// Step taken back after an empty page.
    pub probe: Duration,
    /// Maximum number of page requests before giving up.
    pub max_pages: usize,
    /// Price stream to request.
    pub what_to_show: WhatToShow,
    /// Regular trading hours only.
    pub use_rth: bool,
}

impl BackfillConfig {
    /// Defaults for `timeframe`: a page size the provider accepts in one
    /// request, a one-day probe and the default request cap.
    pub fn for_timeframe(timeframe: Timeframe) -> Self {
        Self {
            page_duration: timeframe.default_page_duration(),
            probe: Duration::days(1),
            max_pages: DEFAULT_MAX_PAGES,
            what_to_show: WhatToShow::default(),
            use_rth: false,
        }
    }
}

/// Where the paginator is in its walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorState {
    /// The last page had data.
    Paging,
    /// The last page was empty; probing further back.
    Draining,
    /// The cursor reached the resume boundary.
    Done,
}

impl fmt::Display for PaginatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaginatorState::Paging => "paging",
            PaginatorState::Draining => "draining",
            PaginatorState::Done => "done",
        })
    }
}

/// Outcome of a completed backfill.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillReport {
    /// Series that was backfilled.
    pub series: Arc<SeriesKey>,
    /// Rows handed to the writer (duplicates included).
    pub bars_written: usize,
    /// Page requests made.
    pub pages: usize,
    /// Page requests that came back empty.
    pub empty_pages: usize,
    /// Cursor when the walk stopped; at or before the boundary.
    pub final_cursor: DateTime<Utc>,
}

/// Reasons a series' backfill stops early.
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    /// A row in the page had an unusable timestamp; nothing from that page was written.
    #[error("{series}: page ending {end} has a malformed timestamp: {source}")]
    MalformedTimestamp {
        /// Series label.
        series: String,
        /// End of the offending window.
        end: DateTime<Utc>,
        /// Normalizer error.
        source: MalformedTimestamp,
    },

    /// The source failed to return a page.
    #[error("{series}: fetch of page ending {end} failed: {source}")]
    ProviderFetch {
        /// Series label.
        series: String,
        /// End of the requested window.
        end: DateTime<Utc>,
        /// Provider error.
        source: ProviderError,
    },

    /// The request cap was reached before the boundary.
    #[error("{series}: backfill safety limit of {max_pages} page requests exceeded at cursor {cursor}")]
    SafetyLimitExceeded {
        /// Series label.
        series: String,
        /// Configured cap.
        max_pages: usize,
        /// Cursor when the cap was hit.
        cursor: DateTime<Utc>,
    },

    /// The batch for a page could not be written.
    #[error("{series}: writing page ending {end} failed: {source}")]
    StoreWrite {
        /// Series label.
        series: String,
        /// End of the window whose rows failed to persist.
        end: DateTime<Utc>,
        /// Store error.
        source: StoreError,
    },
}

/// Walks one series backwards through the historical source.
#[derive(Clone)]
pub struct BackfillPaginator {
    source: Arc<dyn HistoricalSource>,
    writer: SeriesWriter,
    config: BackfillConfig,
}

impl BackfillPaginator {
    /// A paginator fetching from `source` and writing through `writer`.
    pub fn new(source: Arc<dyn HistoricalSource>, writer: SeriesWriter, config: BackfillConfig) -> Self {
        Self {
            source,
            writer,
            config,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    fn request(&self, series: &SeriesKey, contract: &Contract, end: DateTime<Utc>) -> HistoricalRequest {
        HistoricalRequest {
            contract: contract.clone(),
            window: Window {
                end,
                duration: self.config.page_duration,
                timeframe: series.timeframe(),
            },
            what_to_show: self.config.what_to_show,
            use_rth: self.config.use_rth,
        }
    }

    /// Backfills `series` from `start_cursor` back to `resume_boundary`.
    ///
    /// Pages are fetched and written strictly one after another. On error the
    /// page being processed has written nothing.
    pub async fn run(
        &self,
        series: &Arc<SeriesKey>,
        contract: &Contract,
        resume_boundary: DateTime<Utc>,
        start_cursor: DateTime<Utc>,
    ) -> Result<BackfillReport, BackfillError> {
        let label = series.to_string();
        let mut cursor = start_cursor;
        let mut report = BackfillReport {
            series: Arc::clone(series),
            bars_written: 0,
            pages: 0,
            empty_pages: 0,
            final_cursor: start_cursor,
        };

        while cursor > resume_boundary {
            if report.pages >= self.config.max_pages {
                return Err(BackfillError::SafetyLimitExceeded {
                    series: label,
                    max_pages: self.config.max_pages,
                    cursor,
                });
            }

            let req = self.request(series, contract, cursor);
            let window_start = req.window.start().unwrap_or(DateTime::<Utc>::MIN_UTC);
            let raw = self
                .source
                .fetch_bars(&req)
                .await
                .map_err(|source| BackfillError::ProviderFetch {
                    series: label.clone(),
                    end: cursor,
                    source,
                })?;
            report.pages += 1;

            if raw.is_empty() {
                report.empty_pages += 1;
                let state = PaginatorState::Draining;
                let next = cursor
                    .checked_sub_signed(self.config.probe)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
                    .min(window_start);
                debug!(series = %label, %state, end = %cursor, next = %next, "empty page");
                cursor = next;
                continue;
            }

            let bars = raw
                .iter()
                .map(|r| normalize_bar(series, r, self.source.source_tag()))
                .collect::<Result<Vec<Bar>, _>>()
                .map_err(|source| BackfillError::MalformedTimestamp {
                    series: label.clone(),
                    end: cursor,
                    source,
                })?;

            let written = self
                .writer
                .insert(&bars)
                .await
                .map_err(|source| BackfillError::StoreWrite {
                    series: label.clone(),
                    end: cursor,
                    source,
                })?;
            report.bars_written += written;
            let state = PaginatorState::Paging;

            let next = next_cursor(cursor, window_start, &bars);
            debug!(
                series = %label,
                %state,
                end = %cursor,
                next = %next,
                bars = written,
                "page written"
            );
            cursor = next;
        }

        let state = PaginatorState::Done;
        report.final_cursor = cursor;
        info!(
            series = %label,
            %state,
            boundary = %resume_boundary,
            pages = report.pages,
            empty_pages = report.empty_pages,
            bars = report.bars_written,
            final_cursor = %cursor,
            "backfill complete"
        );
        Ok(report)
    }
}

/// Where the walk continues after a non-empty page: the earliest bar start or
/// the window start, whichever is older, and never later than one second
/// before `cursor`.
fn next_cursor(cursor: DateTime<Utc>, window_start: DateTime<Utc>, bars: &[Bar]) -> DateTime<Utc> {
    let before_cursor = cursor
        .checked_sub_signed(Duration::seconds(1))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    bars.iter()
        .map(|b| b.timestamp)
        .fold(window_start, std::cmp::min)
        .min(before_cursor)
}
