#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bar_feed::{
    models::{
        bar::{Bar, RawBar},
        contract::Contract,
        request_params::HistoricalRequest,
        series::SeriesKey,
    },
    providers::{ApiSnafu, HistoricalSource, ProviderError},
};
use chrono::{DateTime, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use series_sync::{
    config::SeriesSpec,
    db::{connection, migrate},
    store::{BarStore, StoreError},
};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_all(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn series(symbol: &str, timeframe: &str) -> Arc<SeriesKey> {
    Arc::new(SeriesKey::new(symbol, timeframe.parse().unwrap()))
}

pub fn contract(symbol: &str) -> Contract {
    Contract::new(symbol, "SMART", "USD", "STK").unwrap()
}

pub fn spec(symbol: &str, timeframe: &str, start: DateTime<Utc>) -> SeriesSpec {
    SeriesSpec {
        key: series(symbol, timeframe),
        contract: contract(symbol),
        configured_start: start,
    }
}

pub fn raw(ts: DateTime<Utc>, close: f64) -> RawBar {
    RawBar::at(ts).with_ohlc(close, close, close, close).with_volume(100.0)
}

pub enum Page {
    Bars(Vec<RawBar>),
    Fail(&'static str),
}

/// Historical source that replays scripted pages and records every request end.
///
/// Once the script runs out it keeps answering with `fallback`.
pub struct MockSource {
    pages: Mutex<VecDeque<Page>>,
    fallback: Box<dyn Fn(&HistoricalRequest) -> Vec<RawBar> + Send + Sync>,
    pub requests: Mutex<Vec<HistoricalRequest>>,
}

impl MockSource {
    pub fn scripted(pages: Vec<Page>) -> Self {
        Self::with_fallback(pages, |_| Vec::new())
    }

    pub fn with_fallback(
        pages: Vec<Page>,
        fallback: impl Fn(&HistoricalRequest) -> Vec<RawBar> + Send + Sync + 'static,
    ) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            fallback: Box::new(fallback),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(f: impl Fn(&HistoricalRequest) -> Vec<RawBar> + Send + Sync + 'static) -> Self {
        Self::with_fallback(Vec::new(), f)
    }

    pub fn request_ends(&self) -> Vec<DateTime<Utc>> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.window.end)
            .collect()
    }

    pub fn fetches(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoricalSource for MockSource {
    fn source_tag(&self) -> &str {
        "mock"
    }

    async fn fetch_bars(&self, req: &HistoricalRequest) -> Result<Vec<RawBar>, ProviderError> {
        self.requests.lock().unwrap().push(req.clone());
        let next = self.pages.lock().unwrap().pop_front();
        match next {
            Some(Page::Bars(bars)) => Ok(bars),
            Some(Page::Fail(message)) => ApiSnafu { message }.fail(),
            None => Ok((self.fallback)(req)),
        }
    }
}

/// Store whose writes always fail; reads report an empty series.
pub struct FailingStore;

#[async_trait]
impl BarStore for FailingStore {
    async fn last_timestamp(&self, _series: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(None)
    }

    async fn insert_bars(&self, _rows: &[Bar]) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("disk full".into()))
    }
}
