//! Bar intervals expressed as exchange interval codes.
//!
//! An [`Interval`] pairs a non-zero amount with an [`IntervalUnit`]. It parses
//! from and displays as the compact codes used by crypto exchanges and by the
//! persisted `price_bars.interval` column:
//!
//! ```
//! use market_data_ingestor::models::interval::{Interval, IntervalUnit};
//!
//! let iv: Interval = "4h".parse().unwrap();
//! assert_eq!(iv.amount().get(), 4);
//! assert_eq!(iv.unit(), IntervalUnit::Hour);
//! assert_eq!(iv.to_string(), "4h");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

const MILLIS_PER_MINUTE: i64 = 60_000;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;
const MILLIS_PER_WEEK: i64 = 7 * MILLIS_PER_DAY;

const ONE: NonZeroU32 = match NonZeroU32::new(1) {
    Some(nz) => nz,
    None => unreachable!(),
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("empty interval")]
    Empty,

    #[error("invalid interval amount in {input:?}")]
    InvalidAmount { input: String },

    #[error("unknown interval unit {unit:?} in {input:?}")]
    UnknownUnit { input: String, unit: String },
}

/// Interval granularity. Week buckets are Monday-aligned, months are calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl IntervalUnit {
    fn code(self) -> &'static str {
        match self {
            IntervalUnit::Minute => "m",
            IntervalUnit::Hour => "h",
            IntervalUnit::Day => "d",
            IntervalUnit::Week => "w",
            IntervalUnit::Month => "M",
        }
    }
}

/// An interval = amount × unit (e.g. 15-Minute, 4-Hour, 1-Day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    amount: NonZeroU32,
    unit: IntervalUnit,
}

impl Interval {
    /// One calendar day, the granularity the cache backfills at.
    pub const ONE_DAY: Interval = Interval::new(ONE, IntervalUnit::Day);

    pub const fn new(amount: NonZeroU32, unit: IntervalUnit) -> Self {
        Self { amount, unit }
    }

    pub const fn amount(&self) -> NonZeroU32 {
        self.amount
    }

    pub const fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// Fixed width of one bar in milliseconds; `None` for calendar months.
    pub fn millis(&self) -> Option<i64> {
        let per_unit = match self.unit {
            IntervalUnit::Minute => MILLIS_PER_MINUTE,
            IntervalUnit::Hour => MILLIS_PER_HOUR,
            IntervalUnit::Day => MILLIS_PER_DAY,
            IntervalUnit::Week => MILLIS_PER_WEEK,
            IntervalUnit::Month => return None,
        };
        Some(per_unit * i64::from(self.amount.get()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount.get(), self.unit.code())
    }
}

impl FromStr for Interval {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IntervalError::Empty);
        }
        let split = s
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);

        let amount = digits
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| IntervalError::InvalidAmount {
                input: s.to_string(),
            })?;

        // "M" is month, everything else is case-insensitive.
        let unit = match unit {
            "M" => IntervalUnit::Month,
            u => match u.to_ascii_lowercase().as_str() {
                "m" | "min" => IntervalUnit::Minute,
                "h" => IntervalUnit::Hour,
                "d" => IntervalUnit::Day,
                "w" => IntervalUnit::Week,
                _ => {
                    return Err(IntervalError::UnknownUnit {
                        input: s.to_string(),
                        unit: unit.to_string(),
                    });
                }
            },
        };
        Ok(Interval::new(amount, unit))
    }
}

impl Serialize for Interval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
