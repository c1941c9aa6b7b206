use std::num::NonZeroU32;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::America::New_York;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var;
use tracing::{debug, warn};

use crate::{
    models::{bar::RawBar, request_params::HistoricalRequest},
    normalize,
    providers::{
        ApiSnafu, HistoricalSource, ProviderError, ProviderInitError,
        alpaca_rest::{
            params::{AlpacaBarsParams, Sort, construct_params},
            response::{AlpacaBar, AlpacaResponse},
        },
    },
};

const BASE_URL: &str = "https://data.alpaca.markets/v2/stocks/bars";

/// Alpaca's free plan allows 200 data requests per minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: NonZeroU32 = nonzero!(200u32);

pub const SOURCE_TAG: &str = "alpaca";

pub struct AlpacaProvider {
    client: Client,
    base_url: String,
    params: AlpacaBarsParams,
    limiter: DefaultDirectRateLimiter,
    _api_key: SecretString,
    _secret_key: SecretString,
}

impl AlpacaProvider {
    /// Creates a new Alpaca provider.
    ///
    /// Reads API keys from the `APCA_API_KEY_ID` and `APCA_API_SECRET_KEY`
    /// environment variables.
    pub fn new() -> Result<Self, ProviderInitError> {
        let api_key = SecretString::new(get_env_var("APCA_API_KEY_ID")?.into());
        let secret_key = SecretString::new(get_env_var("APCA_API_SECRET_KEY")?.into());
        Self::with_credentials(api_key, secret_key)
    }

    pub fn with_credentials(
        api_key: SecretString,
        secret_key: SecretString,
    ) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        let mut key = header::HeaderValue::from_str(api_key.expose_secret())?;
        key.set_sensitive(true);
        headers.insert("APCA-API-KEY-ID", key);
        let mut secret = header::HeaderValue::from_str(secret_key.expose_secret())?;
        secret.set_sensitive(true);
        headers.insert("APCA-API-SECRET-KEY", secret);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            params: AlpacaBarsParams::default(),
            limiter: RateLimiter::direct(Quota::per_minute(DEFAULT_REQUESTS_PER_MINUTE)),
            _api_key: api_key,
            _secret_key: secret_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_params(mut self, params: AlpacaBarsParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: NonZeroU32) -> Self {
        self.limiter = RateLimiter::direct(Quota::per_minute(requests_per_minute));
        self
    }

    async fn fetch_page(
        &self,
        query: &[(String, String)],
        page_token: Option<&str>,
    ) -> Result<AlpacaResponse, ProviderError> {
        self.limiter.until_ready().await;

        let mut request = self.client.get(&self.base_url).query(query);
        if let Some(token) = page_token {
            request = request.query(&[("page_token", token)]);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                message: format!("{status}: {body}"),
            }
            .fail();
        }

        Ok(response.json::<AlpacaResponse>().await?)
    }
}

/// Regular US equity session, 09:30 to 16:00 New York time.
pub fn regular_trading_hours(ts: DateTime<Utc>) -> bool {
    let local = ts.with_timezone(&New_York).time();
    match (NaiveTime::from_hms_opt(9, 30, 0), NaiveTime::from_hms_opt(16, 0, 0)) {
        (Some(open), Some(close)) => local >= open && local < close,
        _ => false,
    }
}

fn keep_for_session(bar: &AlpacaBar) -> bool {
    // Unparseable timestamps are left for the normalizer to reject.
    normalize::parse_text(&bar.timestamp)
        .map(regular_trading_hours)
        .unwrap_or(true)
}

#[async_trait]
impl HistoricalSource for AlpacaProvider {
    fn source_tag(&self) -> &str {
        SOURCE_TAG
    }

    async fn fetch_bars(&self, req: &HistoricalRequest) -> Result<Vec<RawBar>, ProviderError> {
        let query = construct_params(req, &self.params)?;
        let symbol = req.contract.symbol.as_str();

        let mut bars: Vec<AlpacaBar> = Vec::new();
        let mut next_page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let response = self.fetch_page(&query, next_page_token.as_deref()).await?;
            pages += 1;

            if let Some(mut by_symbol) = response.bars {
                if let Some(page) = by_symbol.swap_remove(symbol) {
                    bars.extend(page);
                } else if !by_symbol.is_empty() {
                    warn!(symbol, "Alpaca returned bars for other symbols only");
                }
            }

            match response.next_page_token {
                Some(token) => next_page_token = Some(token),
                None => break,
            }
        }

        let before = bars.len();
        if req.use_rth && req.window.timeframe.is_intraday() {
            bars.retain(keep_for_session);
        }
        debug!(
            symbol,
            end = %req.window.end,
            duration = %req.window.duration,
            pages,
            fetched = before,
            kept = bars.len(),
            "Alpaca bars fetched"
        );

        let mut raw: Vec<RawBar> = bars.into_iter().map(RawBar::from).collect();
        if self.params.sort == Some(Sort::Desc) {
            raw.reverse();
        }
        Ok(raw)
    }
}
