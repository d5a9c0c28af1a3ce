//! Domain values and their Diesel row mappings.
//!
//! Decimals are persisted as canonical TEXT so no precision is lost on the way
//! through SQLite. Bar open times are Unix milliseconds; latest-price
//! observation times are RFC-3339 strings (see [`crate::tz`]).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use market_data_ingestor::models::{interval::Interval, kline::RawKline};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    schema::{latest_prices, price_bars},
    tz,
};

/// One OHLC(V) observation, unique per `(symbol, interval, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub interval: Interval,
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Option<Decimal>,
}

impl PriceBar {
    /// Tag a provider kline with the symbol and interval it was requested for.
    pub fn from_kline(symbol: &str, interval: Interval, kline: RawKline) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval,
            timestamp: tz::from_millis(kline.open_time_ms),
            open: kline.open,
            high: kline.high,
            low: kline.low,
            close: kline.close,
            volume: kline.volume,
        }
    }
}

/// A cached spot-price observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPrice {
    pub symbol: String,
    pub price: Decimal,
    /// When the price was observed.
    pub recorded_at: DateTime<Utc>,
}

/// Row shape for reading `price_bars`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = price_bars)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceBarRow {
    pub symbol: String,
    pub interval: String,
    pub open_time_ms: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: Option<String>,
}

/// Row shape for upserting into `price_bars`.
///
/// `treat_none_as_null` makes a re-supplied bar without volume clear a
/// previously stored volume instead of leaving it behind.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = price_bars, treat_none_as_null = true)]
pub struct NewPriceBarRow {
    pub symbol: String,
    pub interval: String,
    pub open_time_ms: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: Option<String>,
}

impl From<&PriceBar> for NewPriceBarRow {
    fn from(bar: &PriceBar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            interval: bar.interval.to_string(),
            open_time_ms: bar.timestamp.timestamp_millis(),
            open: bar.open.to_string(),
            high: bar.high.to_string(),
            low: bar.low.to_string(),
            close: bar.close.to_string(),
            volume: bar.volume.map(|v| v.to_string()),
        }
    }
}

impl TryFrom<PriceBarRow> for PriceBar {
    type Error = StoreError;

    fn try_from(row: PriceBarRow) -> Result<Self, Self::Error> {
        let interval = Interval::from_str(&row.interval).map_err(|_| StoreError::Decode {
            column: "interval",
            value: row.interval.clone(),
        })?;
        Ok(Self {
            interval,
            timestamp: tz::from_millis(row.open_time_ms),
            open: decode_decimal("open", &row.open)?,
            high: decode_decimal("high", &row.high)?,
            low: decode_decimal("low", &row.low)?,
            close: decode_decimal("close", &row.close)?,
            volume: row
                .volume
                .as_deref()
                .map(|v| decode_decimal("volume", v))
                .transpose()?,
            symbol: row.symbol,
        })
    }
}

/// Row shape for reading `latest_prices`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = latest_prices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LatestPriceRow {
    pub id: Option<i32>,
    pub symbol: String,
    pub price: String,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = latest_prices)]
pub struct NewLatestPriceRow {
    pub symbol: String,
    pub price: String,
    pub recorded_at: String,
}

impl From<&LatestPrice> for NewLatestPriceRow {
    fn from(latest: &LatestPrice) -> Self {
        Self {
            symbol: latest.symbol.clone(),
            price: latest.price.to_string(),
            recorded_at: tz::to_rfc3339_millis(latest.recorded_at),
        }
    }
}

impl TryFrom<LatestPriceRow> for LatestPrice {
    type Error = StoreError;

    fn try_from(row: LatestPriceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            price: decode_decimal("price", &row.price)?,
            recorded_at: tz::parse_stored_ts("recorded_at", &row.recorded_at)?,
            symbol: row.symbol,
        })
    }
}

fn decode_decimal(column: &'static str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value).map_err(|_| StoreError::Decode {
        column,
        value: value.to_string(),
    })
}
