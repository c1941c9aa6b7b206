//! Idempotent write facade shared by backfill and live merge.

use std::sync::Arc;

use bar_feed::models::{bar::Bar, series::SeriesKey};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::store::{BarStore, StoreError};

/// Sole owner of the store handle.
///
/// Cloning shares the same store; the writer is safe to use from concurrent
/// tasks.
#[derive(Clone)]
pub struct SeriesWriter {
    store: Arc<dyn BarStore>,
}

impl SeriesWriter {
    /// Wraps an injected store.
    pub fn new(store: Arc<dyn BarStore>) -> Self {
        Self { store }
    }

    /// Writes `rows` as one batch.
    ///
    /// Returns the number of rows attempted. Rows whose key already exists are
    /// skipped by the store without error. An empty batch returns 0 without
    /// reaching the store.
    pub async fn insert(&self, rows: &[Bar]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let inserted = self.store.insert_bars(rows).await?;
        debug!(
            series = %rows[0].series,
            attempted = rows.len(),
            inserted,
            "bars written"
        );
        Ok(rows.len())
    }

    /// Latest persisted bar start of `series`.
    pub async fn last_timestamp(
        &self,
        series: &SeriesKey,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.last_timestamp(series).await
    }
}
