use indexmap::IndexMap;
use serde::Deserialize;

use crate::models::bar::RawBar;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AlpacaBar {
    /// RFC-3339, left as text for the normalizer.
    #[serde(rename = "t")]
    pub timestamp: String,
    #[serde(rename = "o")]
    pub open: Option<f64>,
    #[serde(rename = "h")]
    pub high: Option<f64>,
    #[serde(rename = "l")]
    pub low: Option<f64>,
    #[serde(rename = "c")]
    pub close: Option<f64>,
    #[serde(rename = "v")]
    pub volume: Option<f64>,
    #[serde(rename = "n", default)]
    pub trade_count: Option<i64>,
    #[serde(rename = "vw", default)]
    pub vwap: Option<f64>,
}

impl From<AlpacaBar> for RawBar {
    fn from(ab: AlpacaBar) -> Self {
        RawBar {
            timestamp: ab.timestamp.as_str().into(),
            open: ab.open,
            high: ab.high,
            low: ab.low,
            close: ab.close,
            volume: ab.volume,
            wap: ab.vwap,
            bar_count: ab.trade_count,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AlpacaResponse {
    /// `null` when the window holds no bars.
    #[serde(default)]
    pub bars: Option<IndexMap<String, Vec<AlpacaBar>>>,
    pub next_page_token: Option<String>,
}
