//! Batch flusher: drains the ingestion queue into batched inserts
//!
//! Two racing triggers decide when a batch is written:
//! - count: the batch reached `batch_max_size`
//! - idle: no record arrived within `idle_flush` and the batch is non-empty
//!
//! Either one flushes immediately and starts a fresh batch. An idle timeout
//! with an empty batch just restarts the wait. When the queue closes (all
//! producers gone) or shutdown fires, the remaining records are flushed
//! before the flusher returns.

use super::prepare::prepare_detection;
use super::queue::{QueueConsumer, Take};
use crate::api::types::DetectionActivityEvent;
use crate::storage::models::DetectionRecord;
use crate::storage::PersistenceGateway;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Counters returned when the flusher exits
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlusherStats {
    pub flushes: u64,
    pub records_flushed: u64,
    /// Records that failed validation and never entered a batch
    pub records_excluded: u64,
    pub failed_flushes: u64,
    /// Records lost to failed writes
    pub records_failed: u64,
}

pub struct BatchFlusher {
    consumer: QueueConsumer<DetectionActivityEvent>,
    gateway: Arc<dyn PersistenceGateway>,
    batch_max_size: usize,
    idle_flush: Duration,
    batch: Vec<DetectionRecord>,
    stats: FlusherStats,
}

impl BatchFlusher {
    pub fn new(
        consumer: QueueConsumer<DetectionActivityEvent>,
        gateway: Arc<dyn PersistenceGateway>,
        batch_max_size: usize,
        idle_flush: Duration,
    ) -> Self {
        let batch_max_size = batch_max_size.max(1);
        Self {
            consumer,
            gateway,
            batch_max_size,
            idle_flush,
            batch: Vec::with_capacity(batch_max_size),
            stats: FlusherStats::default(),
        }
    }

    /// Run until the queue closes or `shutdown` fires
    pub async fn run(mut self, shutdown: CancellationToken) -> FlusherStats {
        log::info!("⚙️  Batch flusher started");
        log::info!("   ├─ Batch size: {}", self.batch_max_size);
        log::info!("   └─ Idle flush: {}s", self.idle_flush.as_secs());

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("🛑 Shutdown requested, draining ingestion queue");
                    self.consumer.close();
                    while let Some(event) = self.consumer.try_take() {
                        self.push(event).await;
                    }
                    break;
                }
                next = self.consumer.take(self.idle_flush) => next,
            };

            match next {
                Take::Item(event) => self.push(event).await,
                Take::Timeout => {
                    if self.batch.is_empty() {
                        log::debug!("😴 Idle timeout, batch empty");
                    } else {
                        log::debug!("⏰ Idle timeout, flushing partial batch of {}", self.batch.len());
                        self.flush().await;
                    }
                }
                Take::Closed => {
                    log::warn!("⚠️  Ingestion queue closed, stopping flusher");
                    break;
                }
            }
        }

        self.flush().await;
        log::info!(
            "✅ Batch flusher stopped: {} flushes, {} records, {} excluded, {} failed",
            self.stats.flushes,
            self.stats.records_flushed,
            self.stats.records_excluded,
            self.stats.failed_flushes
        );
        self.stats
    }

    /// Prepare one event into the current batch, flushing when full
    async fn push(&mut self, event: DetectionActivityEvent) {
        match prepare_detection(&event, Utc::now()) {
            Ok(record) => {
                self.batch.push(record);
                if self.batch.len() >= self.batch_max_size {
                    self.flush().await;
                }
            }
            Err(e) => {
                log::error!("❌ Skipping detection event: {}", e);
                self.stats.records_excluded += 1;
            }
        }
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_max_size));
        match self.gateway.insert_detection_batch(&batch).await {
            Ok(()) => {
                self.stats.flushes += 1;
                self.stats.records_flushed += batch.len() as u64;
                log::debug!("💾 Flushed {} detection records", batch.len());
            }
            Err(e) => {
                self.stats.failed_flushes += 1;
                self.stats.records_failed += batch.len() as u64;
                log::error!("❌ Failed to insert batch of {} records: {}", batch.len(), e);
            }
        }
    }
}
