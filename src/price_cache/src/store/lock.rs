use chrono::{Duration, Utc};
use diesel::{prelude::*, sql_query, sql_types::Text};
use tracing::{debug, trace};

use crate::{
    error::StoreError,
    schema::backfill_locks::dsl as bl,
    store::{LockStore, SharedConn},
    tz,
};

/// Take the lock when no row exists, or when the existing row's lease ran out.
/// A live lease makes the `WHERE` false, the upsert touches zero rows and the
/// caller learns it lost. Timestamps are fixed-width RFC-3339 strings, so the
/// comparison is chronological.
const ACQUIRE_SQL: &str = "\
INSERT INTO backfill_locks (lock_key, locked, holder, acquired_at, lease_expires_at) \
VALUES (?, 1, ?, ?, ?) \
ON CONFLICT(lock_key) DO UPDATE SET \
    locked = 1, \
    holder = excluded.holder, \
    acquired_at = excluded.acquired_at, \
    lease_expires_at = excluded.lease_expires_at \
WHERE backfill_locks.lease_expires_at <= excluded.acquired_at";

/// Longest accepted lease: one day.
pub const MAX_LEASE_SECS: i64 = 86_400;

/// [`LockStore`] backed by the `backfill_locks` table with a fixed lease.
pub struct SqliteLockStore {
    conn: SharedConn,
    lease: Duration,
}

impl SqliteLockStore {
    /// `lease` must be between one second and [`MAX_LEASE_SECS`].
    pub fn open(database_url: &str, lease: Duration) -> Result<Self, StoreError> {
        let lease_secs = lease.num_seconds();
        if !(1..=MAX_LEASE_SECS).contains(&lease_secs) {
            return Err(StoreError::LeaseOutOfRange {
                lease_secs,
                max_secs: MAX_LEASE_SECS,
            });
        }
        Ok(Self {
            conn: SharedConn::open(database_url)?,
            lease,
        })
    }
}

impl LockStore for SqliteLockStore {
    fn try_acquire(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        let acquired_at = tz::to_rfc3339_millis(now);
        let expires_at = now
            .checked_add_signed(self.lease)
            .map(tz::to_rfc3339_millis)
            .ok_or_else(|| StoreError::LeaseOutOfRange {
                lease_secs: self.lease.num_seconds(),
                max_secs: MAX_LEASE_SECS,
            })?;

        let mut conn = self.conn.lock()?;
        let affected = sql_query(ACQUIRE_SQL)
            .bind::<Text, _>(key)
            .bind::<Text, _>(holder)
            .bind::<Text, _>(acquired_at.as_str())
            .bind::<Text, _>(expires_at.as_str())
            .execute(&mut *conn)?;

        let acquired = affected == 1;
        debug!(key, holder, acquired, lease_expires_at = %expires_at, "lock acquire attempt");
        Ok(acquired)
    }

    fn release(&self, key: &str, holder: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.lock()?;
        let deleted = diesel::delete(
            bl::backfill_locks
                .filter(bl::lock_key.eq(key))
                .filter(bl::holder.eq(holder)),
        )
        .execute(&mut *conn)?;

        trace!(key, holder, deleted, "lock released");
        Ok(())
    }

    fn is_held(&self, key: &str) -> Result<bool, StoreError> {
        let now = tz::to_rfc3339_millis(Utc::now());
        let mut conn = self.conn.lock()?;
        let live: i64 = bl::backfill_locks
            .filter(bl::lock_key.eq(key))
            .filter(bl::locked.eq(true))
            .filter(bl::lease_expires_at.gt(now))
            .count()
            .get_result(&mut *conn)?;
        Ok(live > 0)
    }
}
