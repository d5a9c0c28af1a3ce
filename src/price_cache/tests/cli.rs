use std::process::Command;

use serde_json::Value;

mod common;

#[test]
fn migrate_then_reject_bad_interval() {
    let db = common::setup_db();

    let output = Command::new(env!("CARGO_BIN_EXE_price-cache"))
        .arg("migrate")
        .env("PRICE_CACHE_DATABASE_URL", &db.path)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run price-cache");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let json: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(json["applied"], 0);

    let output = Command::new(env!("CARGO_BIN_EXE_price-cache"))
        .args([
            "range",
            "--symbol",
            "BTCUSDT",
            "--interval",
            "3y",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-02",
        ])
        .env("PRICE_CACHE_DATABASE_URL", &db.path)
        .output()
        .expect("run price-cache");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("3y"));
}
