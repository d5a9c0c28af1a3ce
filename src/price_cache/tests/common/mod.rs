#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::{QueryableByName, prelude::*, sql_types::{Integer, Text}};
use market_data_ingestor::{
    models::{kline::RawKline, request_params::KlineRequest},
    providers::{ApiSnafu, DataProvider, ProviderError},
};
use price_cache::{
    backfill::BackfillOptions,
    clock::Clock,
    db::{connection, migrate},
    gap,
    service::{PriceCacheService, ServiceOptions},
    store::{SqliteLatestPriceStore, SqliteLockStore, SqlitePriceStore},
};
use rust_decimal::Decimal;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/cache.db
}

/// Fresh migrated database in a temp dir.
pub fn setup_db() -> TestDb {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("cache.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");
    TestDb { _dir: dir, path }
}

pub fn connect(db: &TestDb) -> SqliteConnection {
    connection::connect_sqlite(&db.path).expect("connect")
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Deterministic daily close for a date, so tests can predict values.
pub fn close_for(day: NaiveDate) -> Decimal {
    Decimal::from(day.signed_duration_since(date(2024, 1, 1)).num_days() + 100)
}

/// In-memory provider that serves one daily bar per requested day, counts
/// calls per `start_ms`, and can be told to fail specific days.
#[derive(Default)]
pub struct FakeProvider {
    calls: Mutex<HashMap<i64, usize>>,
    failing: Mutex<HashSet<NaiveDate>>,
    spot: Mutex<Option<Decimal>>,
    spot_calls: Mutex<usize>,
    delay: StdDuration,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each fetch sleeps this long, widening race windows.
    pub fn with_delay(delay: StdDuration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_on(&self, day: NaiveDate) {
        self.failing.lock().unwrap().insert(day);
    }

    pub fn heal(&self, day: NaiveDate) {
        self.failing.lock().unwrap().remove(&day);
    }

    pub fn set_spot(&self, price: Option<Decimal>) {
        *self.spot.lock().unwrap() = price;
    }

    pub fn calls_for(&self, day: NaiveDate) -> usize {
        let (start, _) = gap::day_bounds_ms(day);
        self.calls.lock().unwrap().get(&start).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn spot_calls(&self) -> usize {
        *self.spot_calls.lock().unwrap()
    }
}

#[async_trait]
impl DataProvider for FakeProvider {
    async fn fetch_range(&self, request: &KlineRequest) -> Result<Vec<RawKline>, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.start_ms)
            .or_default() += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let day = DateTime::<Utc>::from_timestamp_millis(request.start_ms)
            .unwrap()
            .date_naive();
        if self.failing.lock().unwrap().contains(&day) {
            return ApiSnafu {
                status: 503_u16,
                message: format!("no data for {day}"),
            }
            .fail();
        }

        let close = close_for(day);
        Ok(vec![RawKline {
            open_time_ms: request.start_ms,
            open: close - Decimal::ONE,
            high: close + Decimal::ONE,
            low: close - Decimal::TWO,
            close,
            volume: Some(Decimal::TEN),
        }])
    }

    async fn fetch_current(&self, _symbol: &str) -> Result<Decimal, ProviderError> {
        *self.spot_calls.lock().unwrap() += 1;
        match *self.spot.lock().unwrap() {
            Some(price) => Ok(price),
            None => ApiSnafu {
                status: 502_u16,
                message: "ticker unavailable",
            }
            .fail(),
        }
    }
}

pub fn fast_options() -> ServiceOptions {
    ServiceOptions {
        freshness_window: chrono::Duration::seconds(60),
        backfill: BackfillOptions {
            poll_interval: StdDuration::from_millis(20),
            wait_timeout: StdDuration::from_secs(10),
        },
    }
}

/// A service with its own stores (own connections) on `db`, as a separate worker would have.
pub fn worker(
    db: &TestDb,
    provider: Arc<FakeProvider>,
    clock: Arc<dyn Clock>,
    options: ServiceOptions,
) -> PriceCacheService {
    worker_with_lease(db, provider, clock, options, chrono::Duration::seconds(300))
}

pub fn worker_with_lease(
    db: &TestDb,
    provider: Arc<FakeProvider>,
    clock: Arc<dyn Clock>,
    options: ServiceOptions,
    lease: chrono::Duration,
) -> PriceCacheService {
    PriceCacheService::new(
        Arc::new(SqlitePriceStore::open(&db.path).expect("price store")),
        Arc::new(SqliteLockStore::open(&db.path, lease).expect("lock store")),
        Arc::new(SqliteLatestPriceStore::open(&db.path).expect("latest store")),
        provider,
        clock,
        options,
    )
}
