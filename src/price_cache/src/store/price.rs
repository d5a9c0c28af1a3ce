use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use market_data_ingestor::models::interval::Interval;
use tracing::debug;

use crate::{
    error::StoreError,
    models::{NewPriceBarRow, PriceBar, PriceBarRow},
    schema::price_bars::{self, dsl as pb},
    store::{PriceStore, SharedConn},
    tz,
};

/// [`PriceStore`] backed by the `price_bars` table.
pub struct SqlitePriceStore {
    conn: SharedConn,
}

impl SqlitePriceStore {
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            conn: SharedConn::open(database_url)?,
        })
    }
}

impl PriceStore for SqlitePriceStore {
    fn upsert(&self, bars: &[PriceBar]) -> Result<usize, StoreError> {
        if bars.is_empty() {
            return Ok(0);
        }
        let rows: Vec<NewPriceBarRow> = bars.iter().map(NewPriceBarRow::from).collect();

        let mut conn = self.conn.lock()?;
        let written = conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
            let mut n = 0;
            for row in &rows {
                n += diesel::insert_into(price_bars::table)
                    .values(row)
                    .on_conflict((pb::symbol, pb::interval, pb::open_time_ms))
                    .do_update()
                    .set(row)
                    .execute(conn)?;
            }
            Ok(n)
        })?;

        debug!(bars = bars.len(), written, "upserted price bars");
        Ok(written)
    }

    fn query(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, StoreError> {
        let mut conn = self.conn.lock()?;
        let rows: Vec<PriceBarRow> = pb::price_bars
            .filter(pb::symbol.eq(symbol))
            .filter(pb::interval.eq(interval.to_string()))
            .filter(pb::open_time_ms.between(start.timestamp_millis(), end.timestamp_millis()))
            .order(pb::open_time_ms.asc())
            .select(PriceBarRow::as_select())
            .load(&mut *conn)?;

        rows.into_iter().map(PriceBar::try_from).collect()
    }

    fn dates_present(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeSet<NaiveDate>, StoreError> {
        let mut conn = self.conn.lock()?;
        let opens: Vec<i64> = pb::price_bars
            .filter(pb::symbol.eq(symbol))
            .filter(pb::interval.eq(interval.to_string()))
            .filter(pb::open_time_ms.between(start.timestamp_millis(), end.timestamp_millis()))
            .select(pb::open_time_ms)
            .load(&mut *conn)?;

        Ok(opens
            .into_iter()
            .map(|ms| tz::from_millis(ms).date_naive())
            .collect())
    }
}
