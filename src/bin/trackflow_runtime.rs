//! Trackflow Runtime - both pipelines in one process
//!
//! Runs the dashboard poll loop and the live subscription ingestion side by
//! side over a single SQLite gateway. Ctrl+C lets the in-flight aggregation
//! cycle and the pending batch finish before exit.
//!
//! Usage:
//!   cargo run --release --bin trackflow_runtime

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackflow::api::{QueryTransport, SubscriptionTransport, WorldsClient, WsSubscriber};
use trackflow::config::AppConfig;
use trackflow::dashboard::run_poll_cycles;
use trackflow::ingest::{ingestion_queue, AlertPolicy, BatchFlusher, SubscriptionSupervisor};
use trackflow::logging;
use trackflow::storage::{PersistenceGateway, SqliteGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    logging::init(&config.rust_log);

    info!("🚀 Trackflow Runtime");
    info!("   ├─ API: {}", config.api.api_url);
    info!("   ├─ Subscription: {}", config.api.ws_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   └─ Devices: {}", config.dashboard.device_ids.join(", "));

    info!("🔧 Initializing database...");
    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteGateway::open(&config.db_path, &config.schema_dir)?);
    info!("✅ Database initialized");

    let queries: Arc<dyn QueryTransport> = Arc::new(WorldsClient::new(&config.api)?);
    let feed: Arc<dyn SubscriptionTransport> = Arc::new(WsSubscriber::new(&config.api));
    let shutdown = CancellationToken::new();

    let dashboard_handle = tokio::spawn(run_poll_cycles(
        queries,
        Arc::clone(&gateway),
        config.dashboard.clone(),
        shutdown.clone(),
    ));

    let ingest = &config.ingest;
    let (producer, consumer) = ingestion_queue(ingest.queue_capacity);
    let flusher = BatchFlusher::new(consumer, Arc::clone(&gateway), ingest.batch_max_size, ingest.idle_flush);
    let flusher_handle = tokio::spawn(flusher.run(shutdown.clone()));

    let supervisor = SubscriptionSupervisor::new(
        feed,
        gateway,
        producer,
        AlertPolicy::new(&ingest.alert_tag, &ingest.alert_producer_id),
        ingest.reconnect_backoff,
    );
    let supervisor_handle = tokio::spawn(supervisor.run(shutdown.clone()));

    info!("✅ All tasks spawned");
    info!("   ├─ Dashboard poll loop (every {}s)", config.dashboard.poll_interval.as_secs());
    info!("   ├─ Subscription supervisor");
    info!("   └─ Batch flusher");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Received Ctrl+C, shutting down..."),
        Err(e) => error!("❌ Failed to listen for Ctrl+C: {}", e),
    }
    shutdown.cancel();

    let cycles = dashboard_handle.await?;
    let supervisor_stats = supervisor_handle.await?;
    let flusher_stats = flusher_handle.await?;

    info!("✅ Trackflow runtime stopped");
    info!("   ├─ Aggregation cycles: {}", cycles);
    info!("   ├─ Events received: {}", supervisor_stats.events_received);
    info!("   └─ Records flushed: {}", flusher_stats.records_flushed);
    Ok(())
}
