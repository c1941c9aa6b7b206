use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    models::{
        request_params::{HistoricalRequest, WhatToShow},
        timeframe::{Timeframe, TimeframeUnit},
    },
    providers::{ProviderError, ValidationSnafu},
};

/// Specifies the corporate action adjustment for stock data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    #[default]
    Raw,
    Split,
    Dividend,
    All,
}

impl Adjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::Raw => "raw",
            Adjustment::Split => "split",
            Adjustment::Dividend => "dividend",
            Adjustment::All => "all",
        }
    }
}

/// Specifies the source feed for stock data.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    #[default]
    Sip,
    Iex,
    Otc,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Sip => "sip",
            Feed::Iex => "iex",
            Feed::Otc => "otc",
        }
    }
}

/// Specifies the sort order for the bars.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sort {
    #[default]
    Asc,
    Desc,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Asc => "asc",
            Sort::Desc => "desc",
        }
    }
}

/// Alpaca-specific parameters for a bars request.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AlpacaBarsParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment: Option<Adjustment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<Feed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
}

/// Checks that Alpaca can serve bars of this width.
///
/// Alpaca aggregates 1-59 minutes, 1-23 hours, and single days or weeks.
pub fn validate_timeframe(tf: &Timeframe) -> Result<(), ProviderError> {
    let n = tf.amount().get();
    let ok = match tf.unit() {
        TimeframeUnit::Second => false,
        TimeframeUnit::Minute => n <= 59,
        TimeframeUnit::Hour => n <= 23,
        TimeframeUnit::Day | TimeframeUnit::Week => n == 1,
    };
    if ok {
        Ok(())
    } else {
        ValidationSnafu {
            message: format!("Alpaca does not serve {tf} bars"),
        }
        .fail()
    }
}

/// Alpaca's spelling of a timeframe: `5Min`, `1Hour`, `1Day`, `1Week`.
pub fn alpaca_timeframe(tf: &Timeframe) -> String {
    let unit = match tf.unit() {
        TimeframeUnit::Second => "Sec",
        TimeframeUnit::Minute => "Min",
        TimeframeUnit::Hour => "Hour",
        TimeframeUnit::Day => "Day",
        TimeframeUnit::Week => "Week",
    };
    format!("{}{unit}", tf.amount())
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Query string for one historical page, without the page token.
///
/// The window is `[start, end)`; Alpaca's `end` is inclusive, so one second is
/// taken off it.
pub fn construct_params(
    req: &HistoricalRequest,
    extra: &AlpacaBarsParams,
) -> Result<Vec<(String, String)>, ProviderError> {
    if req.what_to_show != WhatToShow::Trades {
        return ValidationSnafu {
            message: format!("Alpaca only serves TRADES bars, not {}", req.what_to_show),
        }
        .fail();
    }
    validate_timeframe(&req.window.timeframe)?;

    let start = req.window.start().ok_or_else(|| {
        ValidationSnafu {
            message: format!(
                "window {} before {} is out of range",
                req.window.duration, req.window.end
            ),
        }
        .build()
    })?;
    let end = req.window.end - chrono::Duration::seconds(1);

    let mut params = vec![
        ("symbols".to_string(), req.contract.symbol.clone()),
        ("timeframe".to_string(), alpaca_timeframe(&req.window.timeframe)),
        ("start".to_string(), rfc3339(start)),
        ("end".to_string(), rfc3339(end)),
        (
            "adjustment".to_string(),
            extra.adjustment.unwrap_or_default().as_str().to_string(),
        ),
        ("sort".to_string(), extra.sort.unwrap_or_default().as_str().to_string()),
    ];
    if let Some(feed) = extra.feed {
        params.push(("feed".to_string(), feed.as_str().to_string()));
    }
    let currency = extra
        .currency
        .clone()
        .unwrap_or_else(|| req.contract.currency.clone());
    params.push(("currency".to_string(), currency));
    if let Some(limit) = extra.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    Ok(params)
}
