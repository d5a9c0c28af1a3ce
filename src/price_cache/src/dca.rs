//! Dollar-cost-averaging calculator over cached daily closes.
//!
//! A plan buys a fixed quote amount on each scheduled date at that day's
//! close. Dates without a cached close buy nothing and report no value; an
//! unavailable current price leaves the totals empty rather than zero.

use std::{fmt, str::FromStr};

use chrono::{Datelike, Duration, NaiveDate};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DcaError {
    #[error("investment amount must be positive, got {amount}")]
    NonPositiveAmount { amount: Decimal },

    #[error("plan ends ({end}) before it starts ({start})")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("unknown cadence {0:?}, expected daily, weekly or monthly")]
    UnknownCadence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    /// Same day each month, clamped to the 28th so every month has it.
    Monthly,
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        })
    }
}

impl FromStr for Cadence {
    type Err = DcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            _ => Err(DcaError::UnknownCadence(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcaPlan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cadence: Cadence,
    /// Quote-currency amount spent on each scheduled date.
    pub amount: Decimal,
}

impl DcaPlan {
    pub fn validate(&self) -> Result<(), DcaError> {
        if self.amount <= Decimal::ZERO {
            return Err(DcaError::NonPositiveAmount {
                amount: self.amount,
            });
        }
        if self.end < self.start {
            return Err(DcaError::InvertedRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DcaPoint {
    pub date: NaiveDate,
    /// Close used for the purchase; `None` when that day is not cached.
    pub close: Option<Decimal>,
    /// Holdings valued at this day's close, rounded to cents.
    pub holding_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DcaResult {
    pub total_invested: Decimal,
    /// Base-asset units accumulated.
    pub units: Decimal,
    /// Holdings at the current price; `None` when no current price is available.
    pub total_value: Option<Decimal>,
    pub roi_pct: Option<Decimal>,
    pub points: Vec<DcaPoint>,
}

/// Investment dates from `start` while `<= end`.
pub fn schedule(start: NaiveDate, end: NaiveDate, cadence: Cadence) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = Some(start);
    while let Some(date) = current.filter(|d| *d <= end) {
        out.push(date);
        current = match cadence {
            Cadence::Daily => date.checked_add_signed(Duration::days(1)),
            Cadence::Weekly => date.checked_add_signed(Duration::days(7)),
            Cadence::Monthly => next_month(date),
        };
    }
    out
}

fn next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = match date.month() {
        12 => (date.year() + 1, 1),
        m => (date.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, date.day().min(28))
}

/// Run `plan` against `closes` (date → daily close) and value the result at
/// `current_price`.
pub fn compute(
    plan: &DcaPlan,
    closes: &IndexMap<NaiveDate, Decimal>,
    current_price: Option<Decimal>,
) -> Result<DcaResult, DcaError> {
    plan.validate()?;

    let dates = schedule(plan.start, plan.end, plan.cadence);
    let total_invested = plan.amount * Decimal::from(dates.len());

    let mut units = Decimal::ZERO;
    let mut points = Vec::with_capacity(dates.len());
    for date in dates {
        let close = closes.get(&date).copied().filter(|c| *c > Decimal::ZERO);
        let holding_value = close.and_then(|c| {
            units += plan.amount.checked_div(c)?;
            units.checked_mul(c).map(|v| v.round_dp(2))
        });
        points.push(DcaPoint {
            date,
            close,
            holding_value,
        });
    }

    let total_value = current_price.and_then(|p| units.checked_mul(p));
    let roi_pct = total_value.and_then(|value| {
        let gain = (value - total_invested).checked_div(total_invested)?;
        gain.checked_mul(Decimal::ONE_HUNDRED).map(|r| r.round_dp(2))
    });

    Ok(DcaResult {
        total_invested: total_invested.round_dp(2),
        units,
        total_value: total_value.map(|v| v.round_dp(2)),
        roi_pct,
        points,
    })
}
