//! Cache configuration: TOML file, environment overrides, validation.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! database_url = "price_cache.db"
//! freshness_window_secs = 60
//! lock_poll_interval_ms = 500
//! lock_wait_timeout_secs = 30
//! lock_lease_secs = 300
//!
//! [binance]
//! base_url = "https://data-api.binance.vision"
//! requests_per_minute = 1200
//! klines_timeout_secs = 10
//! ticker_timeout_secs = 5
//! ```
//!
//! Environment overrides, applied by [`CacheConfig::apply_env_overrides`]:
//! `PRICE_CACHE_DATABASE_URL`, `PRICE_CACHE_FRESHNESS_SECS`,
//! `PRICE_CACHE_LOCK_WAIT_SECS`, `PRICE_CACHE_LOCK_LEASE_SECS`,
//! `BINANCE_BASE_URL`.

use std::{path::Path, time::Duration};

use anyhow::{Context, bail};
use market_data_ingestor::providers::binance_rest::{BinanceSettings, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use shared_utils::env::{get_env_var_opt, parse_env_var};

use crate::{backfill::BackfillOptions, store::lock::MAX_LEASE_SECS};

/// Upper bound for every configured duration.
const DAY_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// SQLite path or `sqlite:` URL.
    pub database_url: String,
    /// A cached spot price younger than this is served without refetching.
    pub freshness_window_secs: u64,
    pub lock_poll_interval_ms: u64,
    /// How long a caller waits on another worker's backfill before giving up.
    pub lock_wait_timeout_secs: u64,
    /// Lease on a backfill lock; a crashed holder blocks its days at most this long.
    pub lock_lease_secs: u64,
    pub binance: BinanceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinanceConfig {
    pub base_url: String,
    pub requests_per_minute: u32,
    pub klines_timeout_secs: u64,
    pub ticker_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_url: "price_cache.db".to_string(),
            freshness_window_secs: 60,
            lock_poll_interval_ms: 500,
            lock_wait_timeout_secs: 30,
            lock_lease_secs: 300,
            binance: BinanceConfig::default(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            requests_per_minute: 1200,
            klines_timeout_secs: 10,
            ticker_timeout_secs: 5,
        }
    }
}

impl CacheConfig {
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: CacheConfig =
            toml::from_str(toml_str).context("failed to parse cache config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config file {}", path.as_ref().display()))?;
        Self::from_toml_str(&text)
    }

    /// Overlay values from the environment. A set but unparsable variable is an error.
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Some(url) = get_env_var_opt("PRICE_CACHE_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(secs) = parse_env_var::<u64>("PRICE_CACHE_FRESHNESS_SECS")? {
            self.freshness_window_secs = secs;
        }
        if let Some(secs) = parse_env_var::<u64>("PRICE_CACHE_LOCK_WAIT_SECS")? {
            self.lock_wait_timeout_secs = secs;
        }
        if let Some(secs) = parse_env_var::<u64>("PRICE_CACHE_LOCK_LEASE_SECS")? {
            self.lock_lease_secs = secs;
        }
        if let Some(url) = get_env_var_opt("BINANCE_BASE_URL") {
            self.binance.base_url = url;
        }
        self.validate()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            bail!("database_url must not be empty");
        }
        let max_lease = MAX_LEASE_SECS.unsigned_abs();
        for (name, value, max) in [
            ("freshness_window_secs", self.freshness_window_secs, DAY_SECS),
            ("lock_poll_interval_ms", self.lock_poll_interval_ms, DAY_SECS * 1000),
            ("lock_wait_timeout_secs", self.lock_wait_timeout_secs, DAY_SECS),
            ("lock_lease_secs", self.lock_lease_secs, max_lease),
            ("binance.klines_timeout_secs", self.binance.klines_timeout_secs, DAY_SECS),
            ("binance.ticker_timeout_secs", self.binance.ticker_timeout_secs, DAY_SECS),
            (
                "binance.requests_per_minute",
                u64::from(self.binance.requests_per_minute),
                u64::from(u32::MAX),
            ),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
            if value > max {
                bail!("{name} must be at most {max}, got {value}");
            }
        }
        if self.binance.base_url.trim().is_empty() {
            bail!("binance.base_url must not be empty");
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        secs(self.freshness_window_secs)
    }

    pub fn lock_lease(&self) -> chrono::Duration {
        secs(self.lock_lease_secs)
    }

    pub fn backfill_options(&self) -> BackfillOptions {
        BackfillOptions {
            poll_interval: Duration::from_millis(self.lock_poll_interval_ms),
            wait_timeout: Duration::from_secs(self.lock_wait_timeout_secs),
        }
    }

    pub fn binance_settings(&self) -> BinanceSettings {
        BinanceSettings {
            base_url: self.binance.base_url.clone(),
            requests_per_minute: self.binance.requests_per_minute,
            klines_timeout: Duration::from_secs(self.binance.klines_timeout_secs),
            ticker_timeout: Duration::from_secs(self.binance.ticker_timeout_secs),
        }
    }
}

fn secs(value: u64) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
