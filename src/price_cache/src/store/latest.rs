use diesel::prelude::*;

use crate::{
    error::StoreError,
    models::{LatestPrice, LatestPriceRow, NewLatestPriceRow},
    schema::latest_prices::{self, dsl as lp},
    store::{LatestPriceStore, SharedConn},
};

/// [`LatestPriceStore`] backed by the append-only `latest_prices` table.
pub struct SqliteLatestPriceStore {
    conn: SharedConn,
}

impl SqliteLatestPriceStore {
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            conn: SharedConn::open(database_url)?,
        })
    }
}

impl LatestPriceStore for SqliteLatestPriceStore {
    fn record(&self, price: &LatestPrice) -> Result<(), StoreError> {
        let row = NewLatestPriceRow::from(price);
        let mut conn = self.conn.lock()?;
        diesel::insert_into(latest_prices::table)
            .values(&row)
            .execute(&mut *conn)?;
        Ok(())
    }

    fn latest(&self, symbol: &str) -> Result<Option<LatestPrice>, StoreError> {
        let mut conn = self.conn.lock()?;
        let row: Option<LatestPriceRow> = lp::latest_prices
            .filter(lp::symbol.eq(symbol))
            .order((lp::recorded_at.desc(), lp::id.desc()))
            .select(LatestPriceRow::as_select())
            .first(&mut *conn)
            .optional()?;

        row.map(LatestPrice::try_from).transpose()
    }
}
