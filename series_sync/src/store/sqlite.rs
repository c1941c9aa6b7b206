//! SQLite-backed [`BarStore`].
//!
//! One connection is shared behind a mutex; statements run on tokio's blocking
//! pool so async callers never stall a runtime worker on disk I/O. Every batch
//! is a single `BEGIN IMMEDIATE` transaction, so a page lands whole or not at all.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bar_feed::models::{bar::Bar, series::SeriesKey};
use chrono::{DateTime, Utc};
use diesel::{dsl::max, prelude::*};

use crate::{
    db::connection::connect_sqlite,
    models::{MarketBarRow, NewMarketBar},
    schema::market_bars::{self, dsl as mb},
    store::{BarStore, StoreError},
    tz,
};

/// [`BarStore`] over a single SQLite connection.
#[derive(Clone)]
pub struct SqliteBarStore {
    conn: Arc<Mutex<SqliteConnection>>,
}

impl SqliteBarStore {
    /// Wraps an already configured connection.
    pub fn new(conn: SqliteConnection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Opens `database_url` with the standard PRAGMAs.
    ///
    /// Migrations are not run here; see [`crate::db::migrate::run_all`].
    pub fn open(database_url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(connect_sqlite(database_url)?))
    }

    fn lock(conn: &Mutex<SqliteConnection>) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        conn.lock().map_err(|_| StoreError::Poisoned)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = Self::lock(&conn)?;
            f(&mut guard)
        })
        .await?
    }

    /// All rows of `series`, oldest first.
    pub async fn load_series(&self, series: &SeriesKey) -> Result<Vec<MarketBarRow>, StoreError> {
        let symbol = series.symbol().to_string();
        let timeframe = series.timeframe().to_string();
        self.with_conn(move |conn| {
            Ok(mb::market_bars
                .filter(mb::symbol.eq(&symbol))
                .filter(mb::timeframe.eq(&timeframe))
                .order(mb::ts.asc())
                .select(MarketBarRow::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Number of rows stored for `series`.
    pub async fn count(&self, series: &SeriesKey) -> Result<i64, StoreError> {
        let symbol = series.symbol().to_string();
        let timeframe = series.timeframe().to_string();
        self.with_conn(move |conn| {
            Ok(mb::market_bars
                .filter(mb::symbol.eq(&symbol))
                .filter(mb::timeframe.eq(&timeframe))
                .count()
                .get_result(conn)?)
        })
        .await
    }
}

#[async_trait]
impl BarStore for SqliteBarStore {
    async fn last_timestamp(&self, series: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let symbol = series.symbol().to_string();
        let timeframe = series.timeframe().to_string();
        let latest: Option<String> = self
            .with_conn(move |conn| {
                Ok(mb::market_bars
                    .filter(mb::symbol.eq(&symbol))
                    .filter(mb::timeframe.eq(&timeframe))
                    .select(max(mb::ts))
                    .first(conn)?)
            })
            .await?;

        latest
            .map(|value| {
                tz::parse_ts_to_utc(&value)
                    .map_err(|source| StoreError::CorruptTimestamp { value, source })
            })
            .transpose()
    }

    async fn insert_bars(&self, rows: &[Bar]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            let new_rows: Vec<NewMarketBar<'_>> = rows.iter().map(NewMarketBar::from).collect();
            let inserted = conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
                let mut inserted = 0;
                for row in &new_rows {
                    inserted += diesel::insert_into(market_bars::table)
                        .values(row)
                        .on_conflict((mb::symbol, mb::timeframe, mb::ts))
                        .do_nothing()
                        .execute(conn)?;
                }
                Ok(inserted)
            })?;
            Ok(inserted)
        })
        .await
    }
}
