//! Dashboard Service - periodic window aggregation
//!
//! Every `POLL_INTERVAL_SECS` refreshes the device list and, for each device
//! in `DASHBOARD_DEVICE_IDS`, aggregates the trailing `WINDOW_MINUTES` of
//! tracks into tag counts, top tracks and zones.
//!
//! Usage:
//!   cargo run --release --bin dashboard_service

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackflow::api::{QueryTransport, WorldsClient};
use trackflow::config::AppConfig;
use trackflow::dashboard::run_poll_cycles;
use trackflow::logging;
use trackflow::storage::{PersistenceGateway, SqliteGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    logging::init(&config.rust_log);

    info!("📊 Dashboard Service");
    info!("   ├─ API: {}", config.api.api_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Devices: {}", config.dashboard.device_ids.join(", "));
    info!("   └─ Window: {}m every {}s", config.dashboard.window_minutes, config.dashboard.poll_interval.as_secs());

    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteGateway::open(&config.db_path, &config.schema_dir)?);
    let transport: Arc<dyn QueryTransport> = Arc::new(WorldsClient::new(&config.api)?);
    info!("✅ Database initialized");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("🛑 Received Ctrl+C, finishing current cycle..."),
            Err(e) => error!("❌ Failed to listen for Ctrl+C: {}", e),
        }
        signal.cancel();
    });

    run_poll_cycles(transport, gateway, config.dashboard, shutdown).await;

    info!("✅ Dashboard service stopped");
    Ok(())
}
