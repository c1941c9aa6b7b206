//! Bar series synchronisation: resume planning, backward backfill, live merge,
//! and the SQLite store they write to.
//!
//! Data flows one way per series:
//! [`planner`] picks the resume point from [`store`] state, [`backfill`] walks
//! the historical source newest to oldest down to it, then [`live`] writes the
//! latest bar of every live update. All writes go through [`writer`], and the
//! store's `(symbol, timeframe, ts)` key makes them idempotent.

#![warn(missing_docs)]

pub mod backfill;
pub mod config;
pub mod db;
pub mod live;
pub mod models;
pub mod pipeline;
pub mod planner;
#[allow(missing_docs)]
pub mod schema;
pub mod store;
pub mod tz;
pub mod writer;
