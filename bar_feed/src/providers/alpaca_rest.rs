//! Alpaca v2 stock bars over REST.
//!
//! Only `TRADES` bars exist on this endpoint. Regular-trading-hours
//! filtering is applied client-side since Alpaca returns extended hours too.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::AlpacaProvider;
