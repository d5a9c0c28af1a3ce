//! Public entry point: cached range queries and the latest-price cache.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use market_data_ingestor::{
    models::interval::Interval,
    providers::{DataProvider, binance_rest::BinanceProvider},
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{
    backfill::{BackfillCoordinator, BackfillOptions, BackfillReport},
    clock::{Clock, SystemClock},
    config::CacheConfig,
    db::migrate,
    dca::{self, DcaPlan, DcaResult},
    error::CacheError,
    gap,
    models::{LatestPrice, PriceBar},
    store::{
        LatestPriceStore, LockStore, PriceStore, SqliteLatestPriceStore, SqliteLockStore,
        SqlitePriceStore,
    },
};

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// A stored spot price younger than this is returned without refetching.
    pub freshness_window: chrono::Duration,
    pub backfill: BackfillOptions,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            freshness_window: chrono::Duration::seconds(60),
            backfill: BackfillOptions::default(),
        }
    }
}

/// Read-through cache over a [`DataProvider`].
///
/// All collaborators are injected. Two services built on separate stores that
/// point at the same database behave like two independent workers: they share
/// data and backfill locks, nothing else.
pub struct PriceCacheService {
    prices: Arc<dyn PriceStore>,
    latest: Arc<dyn LatestPriceStore>,
    provider: Arc<dyn DataProvider>,
    clock: Arc<dyn Clock>,
    coordinator: BackfillCoordinator,
    freshness_window: chrono::Duration,
}

impl PriceCacheService {
    pub fn new(
        prices: Arc<dyn PriceStore>,
        locks: Arc<dyn LockStore>,
        latest: Arc<dyn LatestPriceStore>,
        provider: Arc<dyn DataProvider>,
        clock: Arc<dyn Clock>,
        options: ServiceOptions,
    ) -> Self {
        let coordinator =
            BackfillCoordinator::new(prices.clone(), locks, provider.clone(), options.backfill);
        Self {
            prices,
            latest,
            provider,
            clock,
            coordinator,
            freshness_window: options.freshness_window,
        }
    }

    /// Migrate the configured database and wire SQLite stores to the Binance provider.
    pub fn open(config: &CacheConfig) -> anyhow::Result<Self> {
        config.validate()?;
        migrate::run_sqlite(&config.database_url)
            .with_context(|| format!("migrate {}", config.database_url))?;

        let prices = SqlitePriceStore::open(&config.database_url)?;
        let locks = SqliteLockStore::open(&config.database_url, config.lock_lease())?;
        let latest = SqliteLatestPriceStore::open(&config.database_url)?;
        let provider = BinanceProvider::with_settings(config.binance_settings())
            .context("build binance provider")?;

        info!(
            database_url = %config.database_url,
            base_url = provider.base_url(),
            "price cache opened"
        );
        Ok(Self::new(
            Arc::new(prices),
            Arc::new(locks),
            Arc::new(latest),
            Arc::new(provider),
            Arc::new(SystemClock),
            ServiceOptions {
                freshness_window: config.freshness_window(),
                backfill: config.backfill_options(),
            },
        ))
    }

    /// Bars for `[start, end]` after backfilling whatever days are missing.
    ///
    /// The result is whatever is persisted once backfill finishes. Days whose
    /// fetch failed are simply absent, so a short result means partial data,
    /// not a complete answer.
    pub async fn get_range(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, CacheError> {
        self.get_range_with_report(symbol, interval, start, end)
            .await
            .map(|(bars, _)| bars)
    }

    /// [`Self::get_range`] plus the report of the backfill pass that preceded the read.
    pub async fn get_range_with_report(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<PriceBar>, BackfillReport), CacheError> {
        if end < start {
            return Err(CacheError::InvalidRange { start, end });
        }
        ensure_day_aligned(interval)?;
        let symbol = normalize_symbol(symbol);

        let report = self
            .coordinator
            .backfill(&symbol, interval, start, end)
            .await?;
        let bars = self.prices.query(&symbol, interval, start, end)?;
        debug!(%symbol, %interval, bars = bars.len(), "range served");
        Ok((bars, report))
    }

    /// Current price for `symbol`, served from cache while fresh.
    ///
    /// `Ok(None)` means the cache was stale and the provider could not be
    /// reached; store failures are still errors.
    pub async fn get_latest_price(&self, symbol: &str) -> Result<Option<Decimal>, CacheError> {
        let symbol = normalize_symbol(symbol);

        if let Some(cached) = self.latest.latest(&symbol)? {
            let age = self.clock.now() - cached.recorded_at;
            if age < self.freshness_window {
                debug!(%symbol, age_ms = age.num_milliseconds(), "latest price served from cache");
                return Ok(Some(cached.price));
            }
        }

        match self.provider.fetch_current(&symbol).await {
            Ok(price) => {
                self.latest.record(&LatestPrice {
                    symbol: symbol.clone(),
                    price,
                    recorded_at: self.clock.now(),
                })?;
                Ok(Some(price))
            }
            Err(err) => {
                warn!(%symbol, error = %err, "current price unavailable");
                Ok(None)
            }
        }
    }

    /// Run a dollar-cost-averaging plan against cached daily closes.
    pub async fn dca(&self, symbol: &str, plan: &DcaPlan) -> Result<DcaResult, CacheError> {
        plan.validate()?;
        let bars = self
            .get_range(
                symbol,
                Interval::ONE_DAY,
                gap::day_start(plan.start),
                gap::day_end(plan.end),
            )
            .await?;
        let closes: IndexMap<_, _> = bars
            .into_iter()
            .map(|bar| (bar.timestamp.date_naive(), bar.close))
            .collect();
        let current = self.get_latest_price(symbol).await?;

        Ok(dca::compute(plan, &closes, current)?)
    }
}

/// Backfill is per UTC day, so a cacheable interval must tile a day exactly.
fn ensure_day_aligned(interval: Interval) -> Result<(), CacheError> {
    match interval.millis() {
        Some(ms) if ms <= MILLIS_PER_DAY && MILLIS_PER_DAY % ms == 0 => Ok(()),
        _ => Err(CacheError::InvalidInterval {
            interval: interval.to_string(),
        }),
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
