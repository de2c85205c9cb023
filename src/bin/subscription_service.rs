//! Subscription Service - live detection-activity ingestion
//!
//! Keeps the `detectionActivity` subscription open (reconnecting after
//! `RECONNECT_BACKOFF_SECS`), queues every event and inserts them in batches
//! of up to `BATCH_MAX_SIZE`, or after `IDLE_FLUSH_SECS` without new events.
//!
//! Usage:
//!   cargo run --release --bin subscription_service

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trackflow::api::{SubscriptionTransport, WsSubscriber};
use trackflow::config::AppConfig;
use trackflow::ingest::{ingestion_queue, AlertPolicy, BatchFlusher, SubscriptionSupervisor};
use trackflow::logging;
use trackflow::storage::{PersistenceGateway, SqliteGateway};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    logging::init(&config.rust_log);
    let ingest = &config.ingest;

    info!("🌍 Subscription Service");
    info!("   ├─ Subscription: {}", config.api.ws_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Queue capacity: {}", ingest.queue_capacity);
    info!("   └─ Batch: {} records / {}s idle", ingest.batch_max_size, ingest.idle_flush.as_secs());

    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteGateway::open(&config.db_path, &config.schema_dir)?);
    let transport: Arc<dyn SubscriptionTransport> = Arc::new(WsSubscriber::new(&config.api));
    info!("✅ Database initialized");

    let shutdown = CancellationToken::new();
    let (producer, consumer) = ingestion_queue(ingest.queue_capacity);

    let flusher = BatchFlusher::new(consumer, Arc::clone(&gateway), ingest.batch_max_size, ingest.idle_flush);
    let flusher_handle = tokio::spawn(flusher.run(shutdown.clone()));

    let supervisor = SubscriptionSupervisor::new(
        transport,
        gateway,
        producer,
        AlertPolicy::new(&ingest.alert_tag, &ingest.alert_producer_id),
        ingest.reconnect_backoff,
    );
    let supervisor_handle = tokio::spawn(supervisor.run(shutdown.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Received Ctrl+C, flushing pending records..."),
        Err(e) => error!("❌ Failed to listen for Ctrl+C: {}", e),
    }
    shutdown.cancel();

    let supervisor_stats = supervisor_handle.await?;
    let flusher_stats = flusher_handle.await?;

    info!("✅ Subscription service stopped");
    info!("   ├─ Events received: {}", supervisor_stats.events_received);
    info!("   ├─ Alerts raised: {}", supervisor_stats.alerts_raised);
    info!("   ├─ Records flushed: {}", flusher_stats.records_flushed);
    info!("   └─ Records excluded: {}", flusher_stats.records_excluded);
    Ok(())
}
