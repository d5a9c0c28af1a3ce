use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Persistence failures. These are never swallowed: a store error ends the
/// current request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("stored value in column `{column}` is unreadable: {value:?}")]
    Decode { column: &'static str, value: String },

    #[error("store connection mutex poisoned")]
    Poisoned,

    #[error("lock lease of {lease_secs}s is outside 1..={max_secs}s")]
    LeaseOutOfRange { lease_secs: i64, max_secs: i64 },
}

/// Errors surfaced by [`crate::service::PriceCacheService`].
///
/// Provider failures are deliberately absent: a failed sub-range fetch leaves
/// its dates missing and an unavailable spot price is reported as `None`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("timed out after {waited:?} waiting for backfill lock {key}")]
    LockTimeout { key: String, waited: Duration },

    #[error("invalid range: end {end} is before start {start}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("interval {interval} cannot be cached: bars must evenly divide a UTC day")]
    InvalidInterval { interval: String },

    #[error(transparent)]
    Dca(#[from] crate::dca::DcaError),
}
