//! TradeWatch - trade signal monitor
//!
//! Startup: config, logging, clients, ledger, full sheet scan. Then the
//! ingestion loops run until Ctrl-C, after which in-flight monitors get a
//! grace period to finish.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tradewatch::config::AppConfig;
use tradewatch::exchange::BybitClient;
use tradewatch::ingest::Ingestor;
use tradewatch::ledger::DeliveryLedger;
use tradewatch::monitor::{MonitorSettings, PriceMonitor};
use tradewatch::notify::{Dispatcher, TelegramClient};
use tradewatch::resilience::{policies, GuardedFeed, GuardedNotifier, GuardedStore};
use tradewatch::scheduler::MonitorScheduler;
use tradewatch::sheets::{GoogleAuth, SheetsClient};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(config.logging.json);

    info!("🚀 TradeWatch starting");
    info!(config = %config, "Configuration loaded");

    let secrets = config.secrets()?;

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let auth = GoogleAuth::load(
        http.clone(),
        &config.credentials_path(&secrets),
        Path::new(&config.sheets.token_path),
        &config.sheets.token_url,
    )?;
    let sheets = SheetsClient::new(
        http.clone(),
        &config.sheets.api_url,
        &secrets.spreadsheet_id,
        auth,
    );
    let bybit = BybitClient::new(http.clone(), &config.exchange.api_url, &config.exchange.category);
    let telegram = TelegramClient::new(
        http,
        &config.telegram.api_url,
        &secrets.telegram_token,
        secrets.telegram_chat_id,
        secrets.telegram_topic_id,
    );

    let store = GuardedStore::new(Arc::new(sheets), policies::sheets());
    let feed = GuardedFeed::new(Arc::new(bybit), policies::exchange());
    let notifier = GuardedNotifier::new(Arc::new(telegram), policies::telegram());

    let ledger = DeliveryLedger::load(&config.ledger.path, config.ledger.capacity);
    let dispatcher = Arc::new(Dispatcher::new(notifier, ledger));

    let scheduler = Arc::new(MonitorScheduler::new(config.monitor.concurrency_limit));
    let monitor = Arc::new(PriceMonitor::new(
        store.clone(),
        feed,
        dispatcher.clone(),
        MonitorSettings::from(&config.monitor),
    ));
    let ingestor = Arc::new(Ingestor::new(
        store,
        dispatcher,
        scheduler.clone(),
        monitor,
        config.ingest.clone(),
    ));

    if let Err(e) = ingestor.full_scan().await {
        error!(error = %e, "Startup scan failed, relying on periodic rescans");
    }

    let ingest_task = ingestor.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down");

    ingest_task.stop(SHUTDOWN_GRACE).await;
    scheduler.shutdown(SHUTDOWN_GRACE).await;

    info!("👋 TradeWatch stopped");
    Ok(())
}
