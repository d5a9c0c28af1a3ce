//! Provider abstraction for market data sources.
//!
//! This module defines the [`DataProvider`] trait, the unified interface the
//! price cache uses to reach a remote, rate-limited price source. It covers the
//! two questions the cache asks: "give me klines for this sub-range" and "what
//! is the price right now".
//!
//! Each concrete provider (currently [`binance_rest::BinanceProvider`]) handles
//! vendor-specific URLs, pagination, throttling and validation.
//!
//! The trait is async and object safe, so callers hold an
//! `Arc<dyn DataProvider>` and tests substitute in-memory fakes.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::{kline::RawKline, request_params::KlineRequest};
//! use market_data_ingestor::providers::{DataProvider, ProviderError};
//! use rust_decimal::Decimal;
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl DataProvider for MyProvider {
//!     async fn fetch_range(&self, _req: &KlineRequest) -> Result<Vec<RawKline>, ProviderError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn fetch_current(&self, _symbol: &str) -> Result<Decimal, ProviderError> {
//!         Ok(Decimal::ONE)
//!     }
//! }
//! ```

pub mod binance_rest;

use async_trait::async_trait;
use rust_decimal::Decimal;
use snafu::{Backtrace, Snafu};

use crate::models::{
    kline::{KlineDecodeError, RawKline},
    request_params::KlineRequest,
};

/// Trait for fetching bar data and spot prices from a market data provider.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetches every kline whose open time falls inside the request's inclusive
    /// millisecond range, ascending by open time.
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<RawKline>)` - possibly empty when the source has no data.
    /// * `Err(ProviderError)` - network, HTTP, rate-limit or decoding failure.
    async fn fetch_range(&self, request: &KlineRequest) -> Result<Vec<RawKline>, ProviderError>;

    /// Fetches the current traded price for `symbol`.
    async fn fetch_current(&self, symbol: &str) -> Result<Decimal, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains invalid characters.
    #[snafu(display("Invalid API key format: {source}"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider is throttling us (HTTP 429, or 418 after repeated 429s).
    #[snafu(display("Rate limited by provider (HTTP {status})"))]
    RateLimited { status: u16, backtrace: Backtrace },

    /// The provider's API returned a non-success status with a message.
    #[snafu(display("API error (HTTP {status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// A kline row could not be decoded.
    #[snafu(display("Malformed kline: {source}"))]
    Decode {
        source: KlineDecodeError,
        backtrace: Backtrace,
    },

    /// A price field could not be parsed as a decimal.
    #[snafu(display("Malformed price {value:?}: {source}"))]
    InvalidPrice {
        value: String,
        source: rust_decimal::Error,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// True when retrying later (rather than changing the request) may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Reqwest { source, .. } => source.is_timeout() || source.is_connect(),
            ProviderError::RateLimited { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
