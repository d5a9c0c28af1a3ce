//! SQLite connection helpers.
//!
//! [`connect_sqlite`] opens a connection and applies the PRAGMAs every worker
//! needs when several processes share one database file: WAL journaling,
//! foreign_keys=ON, and a 5000ms busy_timeout so concurrent writers queue
//! instead of failing immediately.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use crate::error::StoreError;

/// Strip `sqlite://` / `sqlite:` prefixes so both URLs and bare paths work.
pub fn sqlite_path(database_url: &str) -> &str {
    database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url)
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
pub fn connect_sqlite(database_url: &str) -> Result<SqliteConnection, StoreError> {
    let mut conn = SqliteConnection::establish(sqlite_path(database_url))?;

    sql_query("PRAGMA busy_timeout=5000;").execute(&mut conn)?;
    sql_query("PRAGMA journal_mode=WAL;").execute(&mut conn)?;
    sql_query("PRAGMA foreign_keys=ON;").execute(&mut conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_prefixes_are_stripped() {
        assert_eq!(sqlite_path("sqlite:///tmp/a.db"), "/tmp/a.db");
        assert_eq!(sqlite_path("sqlite:cache.db"), "cache.db");
        assert_eq!(sqlite_path("cache.db"), "cache.db");
        assert_eq!(sqlite_path(":memory:"), ":memory:");
    }
}
