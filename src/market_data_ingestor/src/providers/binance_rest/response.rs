use serde::Deserialize;
use serde_json::Value;

/// `/api/v3/klines` returns an array of positional arrays.
pub type KlineRows = Vec<Vec<Value>>;

/// `/api/v3/ticker/price` payload. The price is a decimal string.
#[derive(Deserialize, Debug)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: String,
}

/// Error body Binance attaches to non-2xx responses.
#[derive(Deserialize, Debug)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

impl ApiErrorBody {
    /// Best-effort extraction of a readable message from an error body.
    pub fn message_from(body: &str) -> String {
        match serde_json::from_str::<ApiErrorBody>(body) {
            Ok(parsed) => format!("{} (code {})", parsed.msg, parsed.code),
            Err(_) if body.trim().is_empty() => "Unknown API error".to_string(),
            Err(_) => body.trim().to_string(),
        }
    }
}
