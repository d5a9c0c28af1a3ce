//! Historical market-data cache with cooperative, lock-coordinated backfill.
//!
//! [`service::PriceCacheService`] answers "bars for symbol S, interval I over
//! `[a, b]`" from SQLite, fetching only the UTC days that are not stored yet.
//! Concurrent workers coordinate through leased per-day locks in the same
//! database, so each missing day is fetched once. A short-lived cache for the
//! current spot price lives alongside it.

pub mod backfill;
pub mod clock;
pub mod config;
pub mod db;
pub mod dca;
pub mod error;
pub mod gap;
pub mod models;
pub mod schema;
pub mod service;
pub mod store;
pub mod tz;
