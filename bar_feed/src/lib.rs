//! Provider-facing side of bar ingestion.
//!
//! - [`models`]: bars, series keys, timeframes, contracts and request shapes.
//! - [`normalize`]: provider timestamps to UTC.
//! - [`providers`]: the historical and live source traits, the Alpaca REST
//!   provider and a polling live feed.

pub mod models;
pub mod normalize;
pub mod providers;
