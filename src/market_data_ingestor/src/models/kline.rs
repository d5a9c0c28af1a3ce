//! Canonical in-memory representation of a raw exchange kline (OHLCV).
//!
//! Exchanges ship klines as positional JSON arrays:
//! `[openTime, open, high, low, close, volume, closeTime, ...]`. Only the first
//! five fields are required. Volume may be absent or `null`; when present it
//! must parse like the prices. Prices arrive as JSON strings on most venues,
//! but plain numbers are accepted as well.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding a positional kline row.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KlineDecodeError {
    #[error("kline row has {len} fields, expected at least 5")]
    TooShort { len: usize },

    #[error("kline field {index} is not an integer millisecond timestamp: {value}")]
    BadTimestamp { index: usize, value: String },

    #[error("kline field {index} is not a decimal: {value}")]
    BadDecimal { index: usize, value: String },
}

/// A single OHLC(V) bar as returned by a price source, before it is tagged with
/// symbol and interval for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawKline {
    /// Bar open time in Unix milliseconds (UTC).
    pub open_time_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Traded base volume. Not every source supplies it.
    pub volume: Option<Decimal>,
}

impl RawKline {
    /// Decode one positional kline row.
    pub fn from_row(row: &[Value]) -> Result<Self, KlineDecodeError> {
        if row.len() < 5 {
            return Err(KlineDecodeError::TooShort { len: row.len() });
        }

        let open_time_ms = row[0]
            .as_i64()
            .ok_or_else(|| KlineDecodeError::BadTimestamp {
                index: 0,
                value: row[0].to_string(),
            })?;

        Ok(Self {
            open_time_ms,
            open: decimal_at(row, 1)?,
            high: decimal_at(row, 2)?,
            low: decimal_at(row, 3)?,
            close: decimal_at(row, 4)?,
            volume: match row.get(5) {
                None | Some(Value::Null) => None,
                Some(_) => Some(decimal_at(row, 5)?),
            },
        })
    }
}

fn decimal_at(row: &[Value], index: usize) -> Result<Decimal, KlineDecodeError> {
    decimal_from_value(&row[index]).ok_or_else(|| KlineDecodeError::BadDecimal {
        index,
        value: row[index].to_string(),
    })
}

/// Parse a decimal from a JSON string or number without going through `f64`.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn decodes_binance_style_row() {
        let row = json!([
            1704067200000_i64,
            "42283.58000000",
            "44184.10000000",
            "42180.77000000",
            "44179.55000000",
            "27174.29903000",
            1704153599999_i64,
            "1169995682.11",
            1079236,
            "14187.45",
            "610958389.29",
            "0"
        ]);
        let k = RawKline::from_row(row.as_array().unwrap()).unwrap();
        assert_eq!(k.open_time_ms, 1_704_067_200_000);
        assert_eq!(k.open, dec!(42283.58));
        assert_eq!(k.high, dec!(44184.10));
        assert_eq!(k.low, dec!(42180.77));
        assert_eq!(k.close, dec!(44179.55));
        assert_eq!(k.volume, Some(dec!(27174.29903)));
    }

    #[test]
    fn accepts_numbers_and_missing_volume() {
        let row = json!([1_000, 1.5, 2, 1, 1.75]);
        let k = RawKline::from_row(row.as_array().unwrap()).unwrap();
        assert_eq!(k.open, dec!(1.5));
        assert_eq!(k.high, dec!(2));
        assert_eq!(k.close, dec!(1.75));
        assert_eq!(k.volume, None);
    }

    #[test]
    fn rejects_short_and_malformed_rows() {
        let short = json!([1_000, "1", "2", "3"]);
        assert_eq!(
            RawKline::from_row(short.as_array().unwrap()),
            Err(KlineDecodeError::TooShort { len: 4 })
        );

        let bad_ts = json!(["yesterday", "1", "2", "0.5", "1"]);
        assert!(matches!(
            RawKline::from_row(bad_ts.as_array().unwrap()),
            Err(KlineDecodeError::BadTimestamp { index: 0, .. })
        ));

        let bad_close = json!([1_000, "1", "2", "0.5", "n/a"]);
        assert!(matches!(
            RawKline::from_row(bad_close.as_array().unwrap()),
            Err(KlineDecodeError::BadDecimal { index: 4, .. })
        ));

        let bad_volume = json!([1_000, "1", "2", "0.5", "1", "lots"]);
        assert!(matches!(
            RawKline::from_row(bad_volume.as_array().unwrap()),
            Err(KlineDecodeError::BadDecimal { index: 5, .. })
        ));

        let null_volume = json!([1_000, "1", "2", "0.5", "1", null]);
        assert_eq!(
            RawKline::from_row(null_volume.as_array().unwrap()).unwrap().volume,
            None
        );
    }
}
