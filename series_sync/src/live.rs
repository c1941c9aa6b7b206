//! Live updates to idempotent writes.
//!
//! Each [`BarUpdate`] carries the provider's whole recent window. Everything
//! but the last bar is assumed persisted already (by backfill or an earlier
//! update), so only the last bar is normalized and written. The store ignores
//! a bar it already holds, which covers the backfill/live overlap. A revision
//! of a bar that is already stored is ignored the same way, so in-progress
//! bars keep their first-written values.

use std::sync::Arc;

use bar_feed::{
    models::series::SeriesKey,
    normalize::{MalformedTimestamp, normalize_bar},
    providers::{BarUpdate, LiveFeed},
};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};

use crate::{store::StoreError, writer::SeriesWriter};

/// Why a single live update was not persisted.
#[derive(Debug, thiserror::Error)]
pub enum LiveMergeError {
    /// The latest bar's timestamp could not be normalized.
    #[error("live bar has a malformed timestamp: {0}")]
    MalformedTimestamp(#[from] MalformedTimestamp),

    /// The write failed.
    #[error("live bar write failed: {0}")]
    StoreWrite(#[from] StoreError),
}

/// Turns live updates into writes for one source.
#[derive(Clone)]
pub struct LiveMergeAdapter {
    writer: SeriesWriter,
    source_tag: String,
}

impl LiveMergeAdapter {
    /// Writes through `writer`, tagging rows with `source_tag`.
    pub fn new(writer: SeriesWriter, source_tag: impl Into<String>) -> Self {
        Self {
            writer,
            source_tag: source_tag.into(),
        }
    }

    /// Persists the latest bar of `update`. Returns the number of rows
    /// attempted: 1, or 0 for an empty snapshot.
    pub async fn apply(
        &self,
        series: &Arc<SeriesKey>,
        update: &BarUpdate,
    ) -> Result<usize, LiveMergeError> {
        let Some(latest) = update.latest() else {
            return Ok(0);
        };
        let bar = normalize_bar(series, latest, &self.source_tag)?;
        Ok(self.writer.insert(std::slice::from_ref(&bar)).await?)
    }

    /// Consumes `feed` on a background task until it closes or the returned
    /// handle is cancelled.
    ///
    /// Failures go to `on_write_failure` and do not stop the subscription.
    pub fn attach<F>(&self, series: Arc<SeriesKey>, mut feed: LiveFeed, on_write_failure: F) -> SubscriptionHandle
    where
        F: Fn(&SeriesKey, &LiveMergeError) + Send + Sync + 'static,
    {
        let adapter = self.clone();
        let task_series = Arc::clone(&series);
        let task = tokio::spawn(async move {
            let series = task_series;
            info!(series = %series, "live merge attached");
            let mut written = 0usize;
            while let Some(update) = feed.recv().await {
                match adapter.apply(&series, &update).await {
                    Ok(n) => {
                        written += n;
                        debug!(
                            series = %series,
                            has_new_bar = update.has_new_bar,
                            snapshot = update.bars.len(),
                            "live update merged"
                        );
                    }
                    Err(e) => on_write_failure(&series, &e),
                }
            }
            info!(series = %series, written, "live feed closed");
            written
        });
        SubscriptionHandle { series, task }
    }
}

/// A running live merge.
#[derive(Debug)]
pub struct SubscriptionHandle {
    series: Arc<SeriesKey>,
    task: JoinHandle<usize>,
}

impl SubscriptionHandle {
    /// The series being merged.
    pub fn series(&self) -> &Arc<SeriesKey> {
        &self.series
    }

    /// Stops consuming; the feed is dropped with the task.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// True once the feed closed or the handle was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the feed to close and returns the rows attempted.
    ///
    /// Returns a cancelled [`JoinError`] if [`cancel`](Self::cancel) was called.
    pub async fn join(self) -> Result<usize, JoinError> {
        self.task.await
    }
}
