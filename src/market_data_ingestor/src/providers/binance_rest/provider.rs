use std::{num::NonZeroU32, str::FromStr, time::Duration};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use reqwest::{Client, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use shared_utils::env::get_env_var_opt;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    models::{kline::RawKline, request_params::KlineRequest},
    providers::{
        ApiSnafu, ClientBuildSnafu, DataProvider, DecodeSnafu, InvalidApiKeySnafu,
        InvalidPriceSnafu, ProviderError, ProviderInitError, RateLimitedSnafu, ReqwestSnafu,
        ValidationSnafu,
        binance_rest::{
            params::{construct_params, page_limit, validate_request},
            response::{ApiErrorBody, KlineRows, TickerPrice},
        },
    },
};

/// Public market-data mirror; serves klines and tickers without an API key.
pub const DEFAULT_BASE_URL: &str = "https://data-api.binance.vision";

const KLINES_PATH: &str = "/api/v3/klines";
const TICKER_PRICE_PATH: &str = "/api/v3/ticker/price";
const USER_AGENT: &str = concat!("price-cache/", env!("CARGO_PKG_VERSION"));

/// HTTP 418: Binance's "you ignored our 429s" ban status.
const STATUS_IP_BANNED: u16 = 418;

/// Binance provider settings.
#[derive(Debug, Clone)]
pub struct BinanceSettings {
    /// Base URL, without trailing path (e.g. `https://api.binance.com`).
    pub base_url: String,
    /// Client-side request budget per minute.
    pub requests_per_minute: u32,
    /// Timeout for each klines page.
    pub klines_timeout: Duration,
    /// Timeout for ticker price requests.
    pub ticker_timeout: Duration,
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            requests_per_minute: 1200,
            klines_timeout: Duration::from_secs(10),
            ticker_timeout: Duration::from_secs(5),
        }
    }
}

pub struct BinanceProvider {
    client: Client,
    base_url: String,
    settings: BinanceSettings,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    _api_key: Option<SecretString>,
}

impl BinanceProvider {
    /// Creates a provider with default settings.
    ///
    /// If `BINANCE_API_KEY` is set it is sent as `X-MBX-APIKEY`; the public
    /// market-data endpoints work without it.
    pub fn new() -> Result<Self, ProviderInitError> {
        Self::with_settings(BinanceSettings::default())
    }

    pub fn with_settings(settings: BinanceSettings) -> Result<Self, ProviderInitError> {
        let api_key = get_env_var_opt("BINANCE_API_KEY").map(|k| SecretString::new(k.into()));

        let mut headers = header::HeaderMap::new();
        if let Some(key) = &api_key {
            headers.insert(
                "X-MBX-APIKEY",
                header::HeaderValue::from_str(key.expose_secret()).context(InvalidApiKeySnafu)?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .build()
            .context(ClientBuildSnafu)?;

        let per_minute =
            NonZeroU32::new(settings.requests_per_minute).unwrap_or(nonzero!(1200u32));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            settings,
            _api_key: api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<T, ProviderError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == STATUS_IP_BANNED {
            warn!(%url, status = status.as_u16(), "binance rate limit hit");
            return RateLimitedSnafu {
                status: status.as_u16(),
            }
            .fail();
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return ApiSnafu {
                status: status.as_u16(),
                message: ApiErrorBody::message_from(&body),
            }
            .fail();
        }

        response.json::<T>().await.context(ReqwestSnafu)
    }
}

#[async_trait]
impl DataProvider for BinanceProvider {
    async fn fetch_range(&self, request: &KlineRequest) -> Result<Vec<RawKline>, ProviderError> {
        validate_request(request)?;

        let limit = page_limit(request) as usize;
        let mut all_klines: Vec<RawKline> = Vec::new();
        let mut cursor = request.start_ms;

        // Page forward by open time until the source runs dry or we pass endTime.
        while cursor <= request.end_ms {
            let query = construct_params(request, cursor);
            let rows: KlineRows = self
                .get_json(KLINES_PATH, &query, self.settings.klines_timeout)
                .await?;
            let page_len = rows.len();

            let mut last_open = None;
            for row in rows {
                let kline = RawKline::from_row(&row).context(DecodeSnafu)?;
                last_open = Some(kline.open_time_ms);
                all_klines.push(kline);
            }

            debug!(
                symbol = %request.symbol,
                interval = %request.interval,
                cursor,
                page_len,
                "fetched klines page"
            );

            match last_open {
                Some(open) if page_len >= limit => {
                    if open < cursor {
                        return ValidationSnafu {
                            message: format!("klines page went backwards at {open}"),
                        }
                        .fail();
                    }
                    cursor = open + 1;
                }
                _ => break,
            }
        }

        all_klines.retain(|k| k.open_time_ms >= request.start_ms && k.open_time_ms <= request.end_ms);
        Ok(all_klines)
    }

    async fn fetch_current(&self, symbol: &str) -> Result<Decimal, ProviderError> {
        if symbol.trim().is_empty() {
            return ValidationSnafu {
                message: "symbol must not be empty",
            }
            .fail();
        }

        let query = [("symbol".to_string(), symbol.to_uppercase())];
        let ticker: TickerPrice = self
            .get_json(TICKER_PRICE_PATH, &query, self.settings.ticker_timeout)
            .await?;

        Decimal::from_str(ticker.price.trim()).with_context(|_| InvalidPriceSnafu {
            value: ticker.price.clone(),
        })
    }
}
