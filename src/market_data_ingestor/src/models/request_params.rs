use serde::{Deserialize, Serialize};

use crate::models::interval::Interval;

/// Vendor-agnostic parameters for requesting klines for one symbol.
///
/// The range is expressed in Unix milliseconds and is **inclusive** on both
/// ends, matching the `startTime`/`endTime` semantics of exchange kline APIs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineRequest {
    /// Exchange symbol (e.g. `"BTCUSDT"`).
    pub symbol: String,

    /// Width of each bar.
    pub interval: Interval,

    /// First open time to include (inclusive, ms).
    pub start_ms: i64,

    /// Last open time to include (inclusive, ms).
    pub end_ms: i64,

    /// Optional page size hint. Providers clamp it to their own maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl KlineRequest {
    pub fn new(symbol: impl Into<String>, interval: Interval, start_ms: i64, end_ms: i64) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            start_ms,
            end_ms,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
