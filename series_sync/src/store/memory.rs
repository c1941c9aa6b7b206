//! In-process [`BarStore`] for tests and dry runs.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bar_feed::models::{bar::Bar, series::SeriesKey};
use chrono::{DateTime, Utc};

use crate::store::{BarStore, StoreError};

type Key = (String, String, DateTime<Utc>);

/// Same uniqueness rules as the SQLite store, kept in a `BTreeMap`.
#[derive(Default)]
pub struct MemoryBarStore {
    rows: Mutex<BTreeMap<Key, Bar>>,
    insert_calls: AtomicUsize,
}

impl MemoryBarStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(series: &SeriesKey, ts: DateTime<Utc>) -> Key {
        (series.symbol().to_string(), series.timeframe().to_string(), ts)
    }

    /// Stored bars of `series`, oldest first.
    pub fn bars(&self, series: &SeriesKey) -> Vec<Bar> {
        let rows = match self.rows.lock() {
            Ok(rows) => rows,
            Err(poisoned) => poisoned.into_inner(),
        };
        let lo = Self::key(series, DateTime::<Utc>::MIN_UTC);
        let hi = Self::key(series, DateTime::<Utc>::MAX_UTC);
        rows.range(lo..=hi).map(|(_, bar)| bar.clone()).collect()
    }

    /// How many times [`BarStore::insert_bars`] reached the store.
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BarStore for MemoryBarStore {
    async fn last_timestamp(&self, series: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.bars(series).last().map(|bar| bar.timestamp))
    }

    async fn insert_bars(&self, rows: &[Bar]) -> Result<usize, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.rows.lock().map_err(|_| StoreError::Poisoned)?;
        let mut inserted = 0;
        for bar in rows {
            let key = Self::key(&bar.series, bar.timestamp);
            if !stored.contains_key(&key) {
                stored.insert(key, bar.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
