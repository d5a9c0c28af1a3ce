//! Binance public market-data REST provider.

pub mod params;
pub mod provider;
pub mod response;

pub use provider::{BinanceProvider, BinanceSettings, DEFAULT_BASE_URL};
