//! Persistent bar storage.
//!
//! [`BarStore`] is the capability the rest of the crate writes through. Both
//! implementations enforce uniqueness on `(symbol, timeframe, ts)` and absorb
//! duplicates silently: re-inserting a bar is a no-op, never an error.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use bar_feed::models::{bar::Bar, series::SeriesKey};
use chrono::{DateTime, Utc};

pub use memory::MemoryBarStore;
pub use sqlite::SqliteBarStore;

/// Errors raised by a [`BarStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected the statement or transaction.
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A persisted timestamp could not be read back.
    #[error("corrupt timestamp {value:?} in store: {source}")]
    CorruptTimestamp {
        /// The stored text.
        value: String,
        /// Parse failure.
        source: chrono::ParseError,
    },

    /// A previous writer panicked while holding the connection.
    #[error("store connection lock poisoned")]
    Poisoned,

    /// The blocking worker running the statement failed.
    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// The store refused the write for another reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Idempotent bar persistence.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Latest persisted bar start for `series`, `None` if the series is empty.
    async fn last_timestamp(&self, series: &SeriesKey) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Inserts `rows` atomically, skipping any whose key already exists.
    ///
    /// Returns how many rows were new.
    async fn insert_bars(&self, rows: &[Bar]) -> Result<usize, StoreError>;
}
