use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{Duration, Utc};
use market_data_ingestor::{
    models::request_params::KlineRequest,
    providers::{
        DataProvider, ProviderError,
        binance_rest::{BinanceProvider, BinanceSettings},
    },
};
use rust_decimal_macros::dec;
use serde_json::json;
use serial_test::serial;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

const DAY_MS: i64 = 86_400_000;
const JAN_1_2024_MS: i64 = 1_704_067_200_000;

type Handler = dyn Fn(&str, &HashMap<String, String>) -> (u16, String) + Send + Sync;

/// Minimal one-request-per-connection HTTP/1.1 server standing in for Binance.
async fn spawn_stub(handler: Arc<Handler>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_srv = hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            let hits = hits_srv.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                hits.fetch_add(1, Ordering::SeqCst);

                let head = String::from_utf8_lossy(&buf);
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
                let params: HashMap<String, String> = query
                    .split('&')
                    .filter_map(|kv| kv.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();

                let (status, body) = handler(path, &params);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(reply.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), hits)
}

fn daily_klines(days: i64) -> Arc<Handler> {
    Arc::new(move |path: &str, params: &HashMap<String, String>| {
        if path != "/api/v3/klines" {
            return (404, String::new());
        }
        let start: i64 = params["startTime"].parse().unwrap();
        let end: i64 = params["endTime"].parse().unwrap();
        let limit: usize = params["limit"].parse().unwrap();
        let rows: Vec<_> = (0..days)
            .map(|d| JAN_1_2024_MS + d * DAY_MS)
            .filter(|t| *t >= start && *t <= end)
            .take(limit)
            .map(|t| json!([t, "100.0", "110.0", "90.0", "105.5", "12.5", t + DAY_MS - 1]))
            .collect();
        (200, serde_json::to_string(&rows).unwrap())
    })
}

fn provider_for(base_url: String) -> BinanceProvider {
    BinanceProvider::with_settings(BinanceSettings {
        base_url,
        ..Default::default()
    })
    .expect("provider")
}

#[tokio::test]
#[serial]
async fn fetch_range_pages_through_all_klines() {
    let (base, hits) = spawn_stub(daily_klines(5)).await;
    let provider = provider_for(base);

    let req = KlineRequest::new(
        "btcusdt",
        "1d".parse().unwrap(),
        JAN_1_2024_MS,
        JAN_1_2024_MS + 10 * DAY_MS,
    )
    .with_limit(2);

    let klines = provider.fetch_range(&req).await.expect("fetch");
    let opens: Vec<i64> = klines.iter().map(|k| k.open_time_ms).collect();
    assert_eq!(
        opens,
        (0..5).map(|d| JAN_1_2024_MS + d * DAY_MS).collect::<Vec<_>>()
    );
    assert_eq!(klines[0].close, dec!(105.5));
    assert_eq!(klines[0].volume, Some(dec!(12.5)));
    // pages of 2, 2, 1
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
#[serial]
async fn fetch_range_for_single_day_returns_that_day_only() {
    let (base, _) = spawn_stub(daily_klines(5)).await;
    let provider = provider_for(base);

    let day = JAN_1_2024_MS + 2 * DAY_MS;
    let req = KlineRequest::new("BTCUSDT", "1d".parse().unwrap(), day, day + DAY_MS - 1);
    let klines = provider.fetch_range(&req).await.expect("fetch");
    assert_eq!(klines.len(), 1);
    assert_eq!(klines[0].open_time_ms, day);
}

#[tokio::test]
#[serial]
async fn http_429_maps_to_rate_limited() {
    let (base, _) = spawn_stub(Arc::new(|_: &str, _: &HashMap<String, String>| {
        (429, String::new())
    })).await;
    let provider = provider_for(base);

    let req = KlineRequest::new("BTCUSDT", "1d".parse().unwrap(), 0, DAY_MS);
    let err = provider.fetch_range(&req).await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited { status: 429, .. }), "{err}");
    assert!(err.is_transient());
}

#[tokio::test]
#[serial]
async fn api_error_body_is_surfaced() {
    let (base, _) = spawn_stub(Arc::new(|_: &str, _: &HashMap<String, String>| {
        (400, r#"{"code":-1121,"msg":"Invalid symbol."}"#.to_string())
    }))
    .await;
    let provider = provider_for(base);

    let err = provider.fetch_current("NOPE").await.unwrap_err();
    match err {
        ProviderError::Api {
            status, message, ..
        } => {
            assert_eq!(status, 400);
            assert!(message.contains("Invalid symbol."));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
#[serial]
async fn fetch_current_parses_ticker() {
    let (base, _) = spawn_stub(Arc::new(|path: &str, params: &HashMap<String, String>| {
        assert_eq!(path, "/api/v3/ticker/price");
        let symbol = params.get("symbol").cloned().unwrap_or_default();
        (200, format!(r#"{{"symbol":"{symbol}","price":"67012.34000000"}}"#))
    }))
    .await;
    let provider = provider_for(base);

    let price = provider.fetch_current("btcusdt").await.expect("price");
    assert_eq!(price, dec!(67012.34));
}

#[tokio::test]
#[serial]
async fn invalid_interval_never_hits_the_network() {
    let (base, hits) = spawn_stub(daily_klines(1)).await;
    let provider = provider_for(base);

    let req = KlineRequest::new("BTCUSDT", "7h".parse().unwrap(), 0, DAY_MS);
    let err = provider.fetch_range(&req).await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
#[ignore]
async fn live_binance_fetches_recent_daily_bars() {
    dotenvy::dotenv().ok();
    let provider = BinanceProvider::new().expect("Failed to create BinanceProvider");

    let end = Utc::now() - Duration::days(1);
    let start = end - Duration::days(5);
    let req = KlineRequest::new(
        "BTCUSDT",
        "1d".parse().unwrap(),
        start.timestamp_millis(),
        end.timestamp_millis(),
    );

    let klines = provider.fetch_range(&req).await.expect("live klines");
    assert!(!klines.is_empty(), "expected at least one BTCUSDT bar");
    assert!(klines.windows(2).all(|w| w[0].open_time_ms < w[1].open_time_ms));

    let price = provider.fetch_current("BTCUSDT").await.expect("live price");
    assert!(price > rust_decimal::Decimal::ZERO);
}
