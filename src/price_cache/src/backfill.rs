//! Cooperative backfill of missing days.
//!
//! For each missing UTC date the coordinator tries to take a leased lock keyed
//! `symbol|interval|dayStartMs|dayEndMs` right before working on that day.
//! A day it wins is re-checked (another worker may have just finished it),
//! fetched, and upserted before its lock is released, so a lease only has to
//! cover one day's fetch. Days it loses are waited on: the coordinator polls
//! until their holders release or the wait deadline passes.
//! Waiters never write; callers re-read the store afterwards.
//!
//! Readers do not take locks, so a concurrent `query` can observe a range
//! while it is being backfilled and see only some of its days.

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, NaiveDate, Utc};
use market_data_ingestor::{
    models::{interval::Interval, request_params::KlineRequest},
    providers::DataProvider,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{CacheError, StoreError},
    gap,
    models::PriceBar,
    store::{LockStore, PriceStore},
};

/// Lock key guarding the backfill of one day.
pub fn lock_key(symbol: &str, interval: Interval, date: NaiveDate) -> String {
    let (start_ms, end_ms) = gap::day_bounds_ms(date);
    format!("{symbol}|{interval}|{start_ms}|{end_ms}")
}

/// A held backfill lock. Dropping the guard releases the lock, on every exit
/// path including errors, panics and cancelled futures.
pub struct LockGuard {
    store: Arc<dyn LockStore>,
    key: String,
    holder: String,
}

impl LockGuard {
    /// `Ok(None)` when someone else holds an unexpired lease on `key`.
    pub fn try_acquire(
        store: Arc<dyn LockStore>,
        key: String,
        holder: &str,
    ) -> Result<Option<Self>, StoreError> {
        if !store.try_acquire(&key, holder)? {
            return Ok(None);
        }
        Ok(Some(Self {
            store,
            key,
            holder: holder.to_string(),
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.store.release(&self.key, &self.holder) {
            // The lease still bounds how long the key stays blocked.
            warn!(key = %self.key, error = %err, "failed to release backfill lock");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    /// Sleep between `is_held` polls while waiting on another holder.
    pub poll_interval: Duration,
    /// Give up waiting after this long.
    pub wait_timeout: Duration,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            wait_timeout: Duration::from_secs(30),
        }
    }
}

/// What one backfill pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Dates missing when the pass started.
    pub missing: BTreeSet<NaiveDate>,
    /// Dates this caller fetched successfully (possibly with zero bars).
    pub fetched: BTreeSet<NaiveDate>,
    /// Dates whose fetch failed; they stay missing.
    pub failed: BTreeSet<NaiveDate>,
    /// Bars written by this caller.
    pub written: usize,
    /// Dates another worker was backfilling; this caller waited for them.
    pub waited: BTreeSet<NaiveDate>,
}

enum DayOutcome {
    HeldElsewhere(String),
    AlreadyPresent,
    Fetched(usize),
    Failed,
}

pub struct BackfillCoordinator {
    prices: Arc<dyn PriceStore>,
    locks: Arc<dyn LockStore>,
    provider: Arc<dyn DataProvider>,
    options: BackfillOptions,
}

impl BackfillCoordinator {
    pub fn new(
        prices: Arc<dyn PriceStore>,
        locks: Arc<dyn LockStore>,
        provider: Arc<dyn DataProvider>,
        options: BackfillOptions,
    ) -> Self {
        Self {
            prices,
            locks,
            provider,
            options,
        }
    }

    /// Fill every missing day of `[start, end]` that no other worker is
    /// already filling, then wait for the ones that are.
    ///
    /// Fetch failures are logged and leave their day missing. Store failures
    /// and an expired wait are returned as errors.
    pub async fn backfill(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BackfillReport, CacheError> {
        let (first_day, last_day) = (start.date_naive(), end.date_naive());
        let mut report = BackfillReport::default();

        let present = self.prices.dates_present(
            symbol,
            interval,
            gap::day_start(first_day),
            gap::day_end(last_day),
        )?;
        report.missing = gap::missing_dates(first_day, last_day, &present);
        if report.missing.is_empty() {
            debug!(%symbol, %interval, "range fully cached");
            return Ok(report);
        }
        info!(
            %symbol,
            %interval,
            missing = report.missing.len(),
            runs = ?gap::coalesce(&report.missing),
            "backfilling missing days"
        );

        let holder = Uuid::new_v4().to_string();
        let mut waiting: Vec<(NaiveDate, String)> = Vec::new();
        for date in &report.missing {
            match self.fill_day(symbol, interval, *date, &holder).await? {
                DayOutcome::HeldElsewhere(key) => {
                    debug!(%key, "day is being backfilled elsewhere");
                    waiting.push((*date, key));
                }
                DayOutcome::AlreadyPresent => {}
                DayOutcome::Fetched(written) => {
                    report.fetched.insert(*date);
                    report.written += written;
                }
                DayOutcome::Failed => {
                    report.failed.insert(*date);
                }
            }
        }

        if !waiting.is_empty() {
            self.wait_for_release(&waiting).await?;
            report.waited = waiting.into_iter().map(|(date, _)| date).collect();
        }

        info!(
            %symbol,
            %interval,
            fetched = report.fetched.len(),
            failed = report.failed.len(),
            written = report.written,
            waited = report.waited.len(),
            "backfill pass complete"
        );
        Ok(report)
    }

    async fn fill_day(
        &self,
        symbol: &str,
        interval: Interval,
        date: NaiveDate,
        holder: &str,
    ) -> Result<DayOutcome, CacheError> {
        let key = lock_key(symbol, interval, date);
        let Some(guard) = LockGuard::try_acquire(self.locks.clone(), key.clone(), holder)? else {
            return Ok(DayOutcome::HeldElsewhere(key));
        };

        // Another worker may have finished the day between the gap scan and our lock.
        let present =
            self.prices
                .dates_present(symbol, interval, gap::day_start(date), gap::day_end(date))?;
        if present.contains(&date) {
            return Ok(DayOutcome::AlreadyPresent);
        }

        let (start_ms, end_ms) = gap::day_bounds_ms(date);
        let request = KlineRequest::new(symbol, interval, start_ms, end_ms);
        let klines = match self.provider.fetch_range(&request).await {
            Ok(klines) => klines,
            Err(err) => {
                warn!(
                    key = guard.key(),
                    %date,
                    error = %err,
                    transient = err.is_transient(),
                    "day fetch failed, leaving it missing"
                );
                return Ok(DayOutcome::Failed);
            }
        };

        debug!(key = guard.key(), bars = klines.len(), "fetched day");
        let bars: Vec<PriceBar> = klines
            .into_iter()
            .map(|k| PriceBar::from_kline(symbol, interval, k))
            .collect();
        let written = self.prices.upsert(&bars)?;
        drop(guard);
        Ok(DayOutcome::Fetched(written))
    }

    async fn wait_for_release(&self, waiting: &[(NaiveDate, String)]) -> Result<(), CacheError> {
        let started = Instant::now();
        let mut pending: Vec<&str> = waiting.iter().map(|(_, key)| key.as_str()).collect();

        loop {
            let mut still_held = Vec::with_capacity(pending.len());
            for key in pending {
                if self.locks.is_held(key)? {
                    still_held.push(key);
                }
            }
            pending = still_held;
            let Some(first) = pending.first() else {
                return Ok(());
            };

            let waited = started.elapsed();
            if waited >= self.options.wait_timeout {
                warn!(key = %first, ?waited, held = pending.len(), "gave up waiting for backfill lock");
                return Err(CacheError::LockTimeout {
                    key: first.to_string(),
                    waited,
                });
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}
