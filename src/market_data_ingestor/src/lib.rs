//! Market data ingestion: the canonical kline model, bar intervals, and the
//! [`DataProvider`](providers::DataProvider) abstraction over remote price sources.

pub mod models;
pub mod providers;
