use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use market_data_ingestor::models::interval::Interval;
use price_cache::{
    config::CacheConfig,
    db::migrate,
    dca::{Cadence, DcaPlan},
    service::PriceCacheService,
    tz,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Historical price cache CLI")]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Print cached bars for a range, backfilling missing days first.
    Range {
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "1d")]
        interval: Interval,
        /// `YYYY-MM-DD` or RFC-3339.
        #[arg(long)]
        start: String,
        /// `YYYY-MM-DD` (whole day) or RFC-3339.
        #[arg(long)]
        end: String,
    },
    /// Print the current price, cached for the freshness window.
    Latest {
        #[arg(long)]
        symbol: String,
    },
    /// Dollar-cost-averaging backtest over cached daily closes.
    Dca {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "monthly")]
        cadence: Cadence,
        #[arg(long)]
        amount: Decimal,
    },
}

fn load_config(path: Option<&str>) -> Result<CacheConfig> {
    let mut cfg = match path {
        Some(p) => CacheConfig::load_path(p)?,
        None => CacheConfig::default(),
    };
    cfg.apply_env_overrides()
        .context("invalid environment override")?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    let output = match cli.cmd {
        Cmd::Migrate => {
            let applied = migrate::run_sqlite(&cfg.database_url)?;
            json!({ "database_url": cfg.database_url, "applied": applied })
        }
        Cmd::Range {
            symbol,
            interval,
            start,
            end,
        } => {
            let start = tz::parse_user_instant(&start, false)?;
            let end = tz::parse_user_instant(&end, true)?;
            let service = PriceCacheService::open(&cfg)?;
            let (bars, report) = service
                .get_range_with_report(&symbol, interval, start, end)
                .await?;
            json!({ "bars": bars, "backfill": report })
        }
        Cmd::Latest { symbol } => {
            let service = PriceCacheService::open(&cfg)?;
            let price = service.get_latest_price(&symbol).await?;
            json!({ "symbol": symbol.to_ascii_uppercase(), "price": price })
        }
        Cmd::Dca {
            symbol,
            start,
            end,
            cadence,
            amount,
        } => {
            let service = PriceCacheService::open(&cfg)?;
            let plan = DcaPlan {
                start,
                end,
                cadence,
                amount,
            };
            let result = service.dca(&symbol, &plan).await?;
            json!({ "symbol": symbol.to_ascii_uppercase(), "plan": plan, "result": result })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
