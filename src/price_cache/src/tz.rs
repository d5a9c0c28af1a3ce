//! Timestamp conversion helpers.
//!
//! All persisted instants are UTC. Lock and latest-price timestamps are stored
//! as RFC-3339 strings with millisecond precision (`2024-01-02T03:04:05.678Z`),
//! a fixed-width format whose lexicographic order matches chronological order,
//! so SQL string comparisons on those columns are time comparisons. Bar open
//! times are stored as Unix milliseconds.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::StoreError;

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a stored RFC-3339 timestamp back to UTC.
pub fn parse_stored_ts(column: &'static str, s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Decode {
            column,
            value: s.to_string(),
        })
}

/// Unix milliseconds to UTC. Out-of-range values clamp to the epoch.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse a user-supplied instant: RFC-3339 with offset, or a bare `YYYY-MM-DD`
/// date. A bare date means midnight UTC when `end_of_day` is false and the last
/// millisecond of that day when it is true.
pub fn parse_user_instant(s: &str, end_of_day: bool) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("expected YYYY-MM-DD or RFC-3339, got {s:?}"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::MIN
    };
    Ok(date.and_time(time).and_utc())
}
