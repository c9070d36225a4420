use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::sync::watch;

use sandbox_signal::binance::BinanceRestClient;
use sandbox_signal::config::{Config, DEFAULT_CONFIG_PATH};
use sandbox_signal::credentials::{EnvCredentialStore, SlackCredentials};
use sandbox_signal::logging;
use sandbox_signal::notify::ChannelNotifier;
use sandbox_signal::status_store::SqliteStatusStore;
use sandbox_signal::trader::{SystemClock, Trader};

/// Indicator ensemble signal generator for one Binance symbol.
#[derive(Debug, Parser)]
#[command(name = "sandbox-signal", version)]
struct Args {
    /// Path to the TOML configuration.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Symbol override, e.g. ETHUSDT.
    #[arg(long)]
    symbol: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Install rustls crypto provider (required by rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install rustls crypto provider"))?;

    let mut config = match Config::load_from(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };
    if let Some(symbol) = args.symbol {
        config.exchange.symbol = symbol.trim().to_ascii_uppercase();
    }

    logging::init(&config.logging)?;

    tracing::info!(
        symbol = %config.exchange.symbol,
        interval = %config.exchange.interval,
        rest_url = %config.exchange.rest_base_url,
        indicators = config.indicators.len(),
        "Starting sandbox-signal"
    );

    let credentials = EnvCredentialStore::load();
    let slack = SlackCredentials::from_store(&credentials);
    if slack.is_none() {
        tracing::warn!("SLACK_WEBHOOK_URL not set, notifications go to the log only");
    }
    let notifier = ChannelNotifier::from_credentials(slack, config.notify.timeout())?;

    let rest_client =
        BinanceRestClient::new(&config.exchange.rest_base_url, config.exchange.request_timeout())?;
    if let Err(e) = rest_client.ping().await {
        tracing::warn!(error = %e, "exchange ping failed, continuing");
    }

    let mut trader = Trader::new(&config, rest_client, notifier, SystemClock)?;
    if let Some(path) = &config.status.sqlite_path {
        let store = SqliteStatusStore::open(path)
            .with_context(|| format!("opening status store {}", path.display()))?;
        trader = trader.with_status_store(Box::new(store));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received");
        let _ = shutdown_tx.send(true);
    });

    trader.run(shutdown_rx).await?;
    Ok(())
}
