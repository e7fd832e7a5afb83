mod config;
mod monitor;
mod notifier;
mod store;
mod usage;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use virtualizor_api::PanelClient;

use crate::config::AppConfig;
use crate::monitor::{AlertEngine, MonitorConfig};
use crate::notifier::{LogNotifier, Notifier, TelegramNotifier};
use crate::store::SqliteStore;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let db = vw_db::create_pool(&config.database_url)
        .await
        .expect("failed to open database");

    vw_db::run_migrations(&db)
        .await
        .expect("failed to run migrations");

    let panel = PanelClient::new().expect("failed to build panel HTTP clients");

    let notifier: Arc<dyn Notifier> = match &config.bot_token {
        Some(token) => Arc::new(
            TelegramNotifier::new(token.as_str()).expect("failed to build telegram HTTP client"),
        ),
        None => {
            tracing::warn!("BOT_TOKEN not set; alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let engine = AlertEngine::new(
        Arc::new(panel),
        Arc::new(SqliteStore::new(db)),
        notifier,
        MonitorConfig {
            interval: Duration::from_secs(config.check_interval_secs),
        },
    );
    let handle = engine.spawn();

    tracing::info!(interval_secs = config.check_interval_secs, "alert engine started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
    handle.abort();
}
