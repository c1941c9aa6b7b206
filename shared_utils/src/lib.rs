//! Small helpers shared by the `bar_feed` and `series_sync` crates.

pub mod env;
