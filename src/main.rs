mod config;
mod exchange;
mod notifications;
mod ratio_book;
mod stats;
mod store;
mod strategy;
mod supervisor;
mod trader;
mod types;
mod web;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use exchange::{BinanceClient, Exchange};
use notifications::{spawn_webhook_dispatcher, AlertType, NotificationManager};
use store::Store;
use strategy::{build_strategy, StrategyContext};
use supervisor::Supervisor;
use types::Bridge;

#[derive(Parser)]
#[command(name = "ratio-rotation-bot")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Automated ratio-arbitrage spot rotation daemon for Binance.US", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("failed to install global tracing subscriber");
    }

    match run(&cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    info!("ratio-rotation-bot v0.1.0");

    let config = config::load(config_path)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config error: {e}");
        }
        anyhow::bail!("configuration is invalid, refusing to start");
    }
    let config = Arc::new(config);
    let bridge = Bridge(config.bridge.clone());

    let store = Arc::new(Store::connect(&config.database_path).await?);
    store.create_schema().await?;
    store.set_supported_coin_list(&config.supported_coin_list).await?;

    let binance = BinanceClient::new(
        config.exchange.api_key.clone(),
        config.exchange.api_secret.clone(),
        config.exchange.use_testnet,
    );
    binance
        .get_account()
        .await
        .map_err(|e| exchange::ExchangeError::CredentialProbe(e.to_string()))?;
    binance.start_stream(&config.bridge, &config.supported_coin_list);
    let exchange: Arc<dyn Exchange> = Arc::new(binance);

    let sink_tx = if config.notifications.webhook_urls.is_empty() {
        None
    } else {
        Some(spawn_webhook_dispatcher(config.notifications.webhook_urls.clone()))
    };
    let notifications = Arc::new(NotificationManager::new(sink_tx));

    let ctx = StrategyContext::new(store.clone(), exchange.clone(), config.clone(), notifications.clone());
    let strategy = build_strategy(&config.strategy, ctx).context("resolving configured strategy")?;
    let strategy: Arc<dyn strategy::Strategy> = Arc::from(strategy);

    strategy.initialize().await?;
    notifications.notify(AlertType::BotStarted).await;

    if config.enable_api {
        let api_state = web::ApiState {
            store: store.clone(),
            notifications: notifications.clone(),
        };
        let port = config.api_port;
        tokio::spawn(async move {
            if let Err(e) = web::serve(api_state, port).await {
                error!("inspection API stopped: {e}");
            }
        });
    }

    let mut supervisor = Supervisor::new();

    let scout_strategy = strategy.clone();
    supervisor.every(Duration::from_secs(config.scout.sleep_time_seconds), "scout", move || {
        let strategy = scout_strategy.clone();
        async move { strategy.scout().await }
    });

    let value_store = store.clone();
    let value_exchange = exchange.clone();
    let value_bridge = bridge.clone();
    let value_coins = config.supported_coin_list.clone();
    supervisor.every(Duration::from_secs(60), "update_value_history", move || {
        let store = value_store.clone();
        let exchange = value_exchange.clone();
        let bridge = value_bridge.clone();
        let coins = value_coins.clone();
        async move { stats::snapshot_coin_values(&store, exchange.as_ref(), &bridge, &coins).await }
    });

    let prune_scout_store = store.clone();
    supervisor.every(Duration::from_secs(60), "prune_scout_history", move || {
        let store = prune_scout_store.clone();
        async move {
            let cutoff = chrono::Utc::now() - chrono::Duration::hours(24);
            store.prune_scout_history(cutoff).await?;
            Ok::<(), anyhow::Error>(())
        }
    });

    let prune_value_store = store.clone();
    supervisor.every(Duration::from_secs(3600), "prune_value_history", move || {
        let store = prune_value_store.clone();
        async move {
            let cutoff = chrono::Utc::now() - chrono::Duration::days(30);
            store.prune_coin_value_history(cutoff).await?;
            Ok::<(), anyhow::Error>(())
        }
    });

    let progress_store = store.clone();
    let progress_notifications = notifications.clone();
    supervisor.every(
        Duration::from_secs(config.log_progress_after_hours.max(1) * 3600),
        "log_progress",
        move || {
            let store = progress_store.clone();
            let notifications = progress_notifications.clone();
            async move { stats::log_progress(&store, &notifications).await }
        },
    );

    supervisor.run_until_shutdown().await?;

    exchange.close().await;
    notifications.notify(AlertType::BotStopped).await;
    info!("shutdown complete");
    Ok(())
}
