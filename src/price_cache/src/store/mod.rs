//! Persistence surfaces for bars, backfill locks and spot-price observations.
//!
//! The traits are synchronous and take `&self`, so a lock guard can release
//! from `Drop` and stores can be shared as `Arc<dyn …>`. SQLite
//! implementations live next to each trait. Every store owns its own
//! connection; workers that must not share memory open their own stores
//! against the same database file and coordinate only through
//! `backfill_locks`.

pub mod latest;
pub mod lock;
pub mod price;

use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, NaiveDate, Utc};
use diesel::SqliteConnection;
use market_data_ingestor::models::interval::Interval;

pub use latest::SqliteLatestPriceStore;
pub use lock::SqliteLockStore;
pub use price::SqlitePriceStore;

use crate::{
    db::connection::connect_sqlite,
    error::StoreError,
    models::{LatestPrice, PriceBar},
};

/// Durable OHLC bar storage keyed by `(symbol, interval, timestamp)`.
pub trait PriceStore: Send + Sync {
    /// Insert or replace every bar; returns how many bars were written.
    fn upsert(&self, bars: &[PriceBar]) -> Result<usize, StoreError>;

    /// Bars with `start <= timestamp <= end`, ascending. Empty when nothing matches.
    fn query(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, StoreError>;

    /// Distinct UTC calendar dates that have at least one stored bar in range.
    fn dates_present(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeSet<NaiveDate>, StoreError>;
}

/// Leased mutual exclusion keyed by an opaque string.
pub trait LockStore: Send + Sync {
    /// Atomically take `key` for `holder` if it is free or its lease has
    /// expired. Returns true iff `holder` now owns the lock.
    fn try_acquire(&self, key: &str, holder: &str) -> Result<bool, StoreError>;

    /// Drop `holder`'s lock on `key`. Releasing a lock that is gone, or that
    /// someone else now holds, is a no-op.
    fn release(&self, key: &str, holder: &str) -> Result<(), StoreError>;

    /// True while some holder has an unexpired lease on `key`.
    fn is_held(&self, key: &str) -> Result<bool, StoreError>;
}

/// Append-only history of spot-price observations.
pub trait LatestPriceStore: Send + Sync {
    fn record(&self, price: &LatestPrice) -> Result<(), StoreError>;

    /// Most recent observation for `symbol`, if any.
    fn latest(&self, symbol: &str) -> Result<Option<LatestPrice>, StoreError>;
}

/// A single SQLite connection usable from `&self`.
pub(crate) struct SharedConn(Mutex<SqliteConnection>);

impl SharedConn {
    pub(crate) fn open(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self(Mutex::new(connect_sqlite(database_url)?)))
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        self.0.lock().map_err(|_| StoreError::Poisoned)
    }
}
