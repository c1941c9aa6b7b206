//! Provider abstraction for market data sources.
//!
//! Two capabilities are modelled, each as an object-safe async trait so the
//! pipeline can hold them as `Arc<dyn ...>` and tests can script them:
//!
//! - [`HistoricalSource`]: one windowed page of bars ending at an instant.
//! - [`LiveSource`]: a subscription that keeps a short recent window fresh and
//!   pushes snapshots over a channel.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use bar_feed::models::{bar::RawBar, request_params::HistoricalRequest};
//! use bar_feed::providers::{HistoricalSource, ProviderError};
//!
//! struct Quiet;
//!
//! #[async_trait]
//! impl HistoricalSource for Quiet {
//!     fn source_tag(&self) -> &str {
//!         "quiet"
//!     }
//!
//!     async fn fetch_bars(&self, _req: &HistoricalRequest) -> Result<Vec<RawBar>, ProviderError> {
//!         Ok(vec![])
//!     }
//! }
//! ```

pub mod alpaca_rest;
pub mod polling;

use std::sync::Arc;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::models::{
    bar::RawBar,
    request_params::{HistoricalRequest, LiveRequest},
};

/// Fetches one page of historical bars.
#[async_trait]
pub trait HistoricalSource: Send + Sync {
    /// Tag stored with every row written from this source.
    fn source_tag(&self) -> &str;

    /// Bars inside `req.window`, ordered oldest first.
    ///
    /// The result covers the whole window. Providers that page internally
    /// follow their continuation tokens before returning; backfill never asks
    /// for the same span twice.
    ///
    /// An empty vector means the provider has no data for the window
    /// (weekend, holiday, before listing); it is not an error.
    async fn fetch_bars(&self, req: &HistoricalRequest) -> Result<Vec<RawBar>, ProviderError>;
}

/// Opens live subscriptions.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn subscribe(&self, req: LiveRequest) -> Result<LiveFeed, ProviderError>;
}

/// One push from a live subscription.
///
/// `bars` is the provider's full current window, oldest first. The snapshot is
/// shared and never mutated after it is sent.
#[derive(Debug, Clone)]
pub struct BarUpdate {
    /// Current window, oldest first.
    pub bars: Arc<[RawBar]>,
    /// The latest bar is a bar the subscription had not reported before, as
    /// opposed to a revision of the in-progress one.
    pub has_new_bar: bool,
}

impl BarUpdate {
    /// Wraps a snapshot.
    pub fn new(bars: impl Into<Arc<[RawBar]>>, has_new_bar: bool) -> Self {
        Self {
            bars: bars.into(),
            has_new_bar,
        }
    }

    /// Newest bar of the snapshot, `None` when it is empty.
    pub fn latest(&self) -> Option<&RawBar> {
        self.bars.last()
    }
}

/// Receiving end of a live subscription.
///
/// Dropping the feed stops the producing task, if there is one.
#[derive(Debug)]
pub struct LiveFeed {
    updates: mpsc::Receiver<BarUpdate>,
    worker: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// A feed fed by `worker`, which is aborted when the feed is dropped.
    pub fn new(updates: mpsc::Receiver<BarUpdate>, worker: JoinHandle<()>) -> Self {
        Self {
            updates,
            worker: Some(worker),
        }
    }

    /// A feed driven by whoever holds the sender.
    pub fn from_receiver(updates: mpsc::Receiver<BarUpdate>) -> Self {
        Self {
            updates,
            worker: None,
        }
    }

    /// Next update, `None` once the producer has gone away.
    pub async fn recv(&mut self) -> Option<BarUpdate> {
        self.updates.recv().await
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"), context(false))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"), context(false))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains invalid characters.
    #[snafu(display("Invalid API key format: {source}"), context(false))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors raised by a source while fetching or subscribing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"), context(false))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API returned a specific error message (e.g., invalid API key).
    #[snafu(display("API error: {message}"))]
    Api {
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// An internal error occurred while processing data within the provider.
    #[snafu(display("Internal provider error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"), context(false))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}
