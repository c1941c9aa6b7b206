//! Run configuration: parsing, validation, and loading.
//!
//! The TOML file has four sections:
//!
//! ```toml
//! [app]
//! timeframe = "1 min"        # provider ("5 mins") or compact ("5m") spelling
//! what_to_show = "TRADES"
//! use_rth = true
//! # page_duration = "1 D"    # defaults per timeframe
//! # max_pages = 5000
//! # live_duration = "2 D"
//! # live_poll_secs = 5
//!
//! [provider]
//! kind = "alpaca"
//! # feed = "iex"
//! # requests_per_minute = 200
//!
//! [db]
//! url = "sqlite:bars.db"
//!
//! [[symbols]]
//! symbol = "AAPL"
//! exchange = "SMART"
//! currency = "USD"
//! secType = "STK"
//! start_time = "2024-01-01T00:00:00Z"
//! ```
//!
//! Entrypoints:
//! - Parse from a TOML string: [`load_config_str`]
//! - Parse from a file path: [`load_config_path`]
//! - Validate into typed settings: [`Config::validate`]
//!
//! `start_time` accepts anything the timestamp normalizer does; text without
//! an offset is read as UTC.

use std::{collections::HashSet, num::NonZeroU32, path::Path, sync::Arc, time::Duration};

use bar_feed::{
    models::{
        contract::{Contract, ContractError},
        duration::{DurationSpec, DurationSpecError},
        request_params::WhatToShow,
        series::SeriesKey,
        timeframe::{Timeframe, TimeframeError},
    },
    normalize::{MalformedTimestamp, parse_text},
    providers::alpaca_rest::params::Feed,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backfill::{BackfillConfig, DEFAULT_MAX_PAGES};

/// Configuration problems, reported before any work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path as given.
        path: String,
        /// I/O failure.
        source: std::io::Error,
    },

    /// The TOML did not match the expected shape.
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `app.timeframe` is not a supported bar width.
    #[error("app.timeframe: {0}")]
    Timeframe(#[from] TimeframeError),

    /// A duration field did not parse.
    #[error("{field}: {source}")]
    Duration {
        /// Dotted field name.
        field: &'static str,
        /// Parse failure.
        source: DurationSpecError,
    },

    /// A numeric field is out of range.
    #[error("{field}: {message}")]
    InvalidValue {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// No `[[symbols]]` entries.
    #[error("config lists no symbols")]
    NoSymbols,

    /// The same symbol appears twice.
    #[error("symbol {0} is configured more than once")]
    DuplicateSymbol(String),

    /// A symbol's `start_time` is not a timestamp.
    #[error("symbol {symbol}: start_time: {source}")]
    StartTime {
        /// Offending symbol.
        symbol: String,
        /// Normalizer error.
        source: MalformedTimestamp,
    },

    /// A symbol's contract fields are unusable.
    #[error("symbol {symbol}: {source}")]
    Contract {
        /// Offending symbol.
        symbol: String,
        /// Contract error.
        source: ContractError,
    },
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bar and session settings shared by all symbols.
    pub app: AppCfg,
    /// Quote provider.
    #[serde(default)]
    pub provider: ProviderCfg,
    /// Storage.
    pub db: DbCfg,
    /// Series to keep in sync.
    #[serde(default)]
    pub symbols: Vec<SymbolCfg>,
}

/// `[app]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppCfg {
    /// Bar width, e.g. `"1 min"` or `"5m"`.
    pub timeframe: String,
    /// Price stream; only `TRADES` is served by Alpaca.
    #[serde(default)]
    pub what_to_show: WhatToShow,
    /// Regular trading hours only.
    #[serde(default)]
    pub use_rth: bool,
    /// Backfill page length, e.g. `"1 D"`. Defaults per timeframe.
    #[serde(default)]
    pub page_duration: Option<String>,
    /// Request cap per series backfill.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Window the live feed keeps refreshed.
    #[serde(default = "default_live_duration")]
    pub live_duration: String,
    /// Seconds between live polls.
    #[serde(default = "default_live_poll_secs")]
    pub live_poll_secs: u64,
}

fn default_max_pages() -> usize {
    DEFAULT_MAX_PAGES
}

fn default_live_duration() -> String {
    "2 D".to_string()
}

fn default_live_poll_secs() -> u64 {
    5
}

/// Supported quote providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Alpaca v2 market data REST API.
    #[default]
    Alpaca,
}

/// `[provider]` section.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderCfg {
    /// Which provider to use.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Alpaca data feed (`sip`, `iex`, `otc`).
    #[serde(default)]
    pub feed: Option<Feed>,
    /// Request budget per minute.
    #[serde(default)]
    pub requests_per_minute: Option<NonZeroU32>,
    /// Endpoint override, mainly for testing.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// `[db]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DbCfg {
    /// SQLite path or `sqlite:` URL.
    pub url: String,
}

/// One `[[symbols]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SymbolCfg {
    /// Ticker.
    pub symbol: String,
    /// Exchange routing, e.g. `"SMART"`.
    pub exchange: String,
    /// Trading currency.
    pub currency: String,
    /// Security type; only `"STK"`.
    #[serde(rename = "secType", alias = "sec_type")]
    pub sec_type: String,
    /// Earliest bar wanted.
    pub start_time: String,
}

/// Live feed settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveSettings {
    /// Window the feed keeps refreshed.
    pub duration: DurationSpec,
    /// Time between polls.
    pub poll_interval: Duration,
}

/// One validated series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    /// Series identity, shared with every component that touches it.
    pub key: Arc<SeriesKey>,
    /// Instrument to request.
    pub contract: Contract,
    /// Earliest bar wanted, UTC.
    pub configured_start: DateTime<Utc>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bar width shared by all series.
    pub timeframe: Timeframe,
    /// Backfill knobs.
    pub backfill: BackfillConfig,
    /// Live feed knobs.
    pub live: LiveSettings,
    /// Provider selection and options.
    pub provider: ProviderCfg,
    /// Database URL.
    pub database_url: String,
    /// Series in file order.
    pub series: Vec<SeriesSpec>,
}

fn duration_field(field: &'static str, value: &str) -> Result<DurationSpec, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::Duration { field, source })
}

impl Config {
    /// Replaces `db.url` when an override (normally `DATABASE_URL`) is present.
    pub fn with_database_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.db.url = url;
        }
        self
    }

    /// Checks every field and resolves it to typed settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let timeframe: Timeframe = self.app.timeframe.parse()?;

        let page_duration = match &self.app.page_duration {
            Some(s) => duration_field("app.page_duration", s)?,
            None => timeframe.default_page_duration(),
        };
        if self.app.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "app.max_pages",
                message: "must be > 0".into(),
            });
        }
        if self.app.live_poll_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "app.live_poll_secs",
                message: "must be > 0".into(),
            });
        }
        // The live merge keeps only the newest bar of each poll, so a slower
        // poll would skip bars.
        let poll_limit = timeframe.bar_duration().num_seconds();
        if i64::try_from(self.app.live_poll_secs).map_or(true, |secs| secs > poll_limit) {
            return Err(ConfigError::InvalidValue {
                field: "app.live_poll_secs",
                message: format!("must not exceed the bar width of {poll_limit}s"),
            });
        }
        if self.db.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "db.url",
                message: "must not be empty".into(),
            });
        }

        let backfill = BackfillConfig {
            page_duration,
            what_to_show: self.app.what_to_show,
            use_rth: self.app.use_rth,
            max_pages: self.app.max_pages,
            ..BackfillConfig::for_timeframe(timeframe)
        };
        let live = LiveSettings {
            duration: duration_field("app.live_duration", &self.app.live_duration)?,
            poll_interval: Duration::from_secs(self.app.live_poll_secs),
        };

        if self.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen = HashSet::new();
        let mut series = Vec::with_capacity(self.symbols.len());
        for s in &self.symbols {
            let contract = Contract::new(&s.symbol, &s.exchange, &s.currency, &s.sec_type).map_err(
                |source| ConfigError::Contract {
                    symbol: s.symbol.clone(),
                    source,
                },
            )?;
            if !seen.insert(contract.symbol.clone()) {
                return Err(ConfigError::DuplicateSymbol(contract.symbol));
            }
            let configured_start =
                parse_text(&s.start_time).map_err(|source| ConfigError::StartTime {
                    symbol: contract.symbol.clone(),
                    source,
                })?;
            series.push(SeriesSpec {
                key: Arc::new(SeriesKey::new(contract.symbol.clone(), timeframe)),
                contract,
                configured_start,
            });
        }

        Ok(Settings {
            timeframe,
            backfill,
            live,
            provider: self.provider.clone(),
            database_url: self.db.url.trim().to_string(),
            series,
        })
    }
}

/// Parse a config from a TOML string.
pub fn load_config_str(s: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(s)?)
}

/// Parse a config from a file path.
pub fn load_config_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_config_str(&s)
}
