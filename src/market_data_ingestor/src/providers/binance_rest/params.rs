use crate::{
    models::{
        interval::{Interval, IntervalUnit},
        request_params::KlineRequest,
    },
    providers::{ProviderError, ValidationSnafu},
};

/// Largest page the klines endpoint will return.
pub const MAX_KLINES_PER_PAGE: u32 = 1000;

/// Ensure the interval is one the klines endpoint accepts.
///
/// Binance only serves a fixed menu: 1/3/5/15/30 minutes, 1/2/4/6/8/12 hours,
/// 1/3 days, 1 week and 1 month.
pub fn validate_interval(interval: &Interval) -> Result<(), ProviderError> {
    let amount = interval.amount().get();
    let ok = match interval.unit() {
        IntervalUnit::Minute => [1, 3, 5, 15, 30].contains(&amount),
        IntervalUnit::Hour => [1, 2, 4, 6, 8, 12].contains(&amount),
        IntervalUnit::Day => [1, 3].contains(&amount),
        IntervalUnit::Week | IntervalUnit::Month => amount == 1,
    };
    if ok {
        Ok(())
    } else {
        ValidationSnafu {
            message: format!("interval {interval} is not supported by Binance"),
        }
        .fail()
    }
}

/// Ensure the request is well-formed before spending a rate-limit token on it.
pub fn validate_request(request: &KlineRequest) -> Result<(), ProviderError> {
    if request.symbol.trim().is_empty() {
        return ValidationSnafu {
            message: "symbol must not be empty",
        }
        .fail();
    }
    if request.end_ms < request.start_ms {
        return ValidationSnafu {
            message: format!(
                "endTime {} is before startTime {}",
                request.end_ms, request.start_ms
            ),
        }
        .fail();
    }
    validate_interval(&request.interval)
}

/// Effective page size for a request.
pub fn page_limit(request: &KlineRequest) -> u32 {
    request
        .limit
        .unwrap_or(MAX_KLINES_PER_PAGE)
        .clamp(1, MAX_KLINES_PER_PAGE)
}

/// Build the query string for one klines page starting at `cursor_ms`.
pub fn construct_params(request: &KlineRequest, cursor_ms: i64) -> Vec<(String, String)> {
    vec![
        ("symbol".to_string(), request.symbol.to_uppercase()),
        ("interval".to_string(), request.interval.to_string()),
        ("startTime".to_string(), cursor_ms.to_string()),
        ("endTime".to_string(), request.end_ms.to_string()),
        ("limit".to_string(), page_limit(request).to_string()),
    ]
}
