//! Persistence gateway trait
//!
//! Tables written (see `/sql/` directory):
//! - `tags_series` - UPSERT on (device_id, timestamp)
//! - `top_tracks` - REPLACE per device (delete + insert in one transaction)
//! - `zones` - UPSERT on device_id
//! - `detection_activity` - INSERT (append-only batches)
//! - `events` - UPSERT on id
//! - `devices` - REPLACE all
//!
//! Every call is idempotent or upsert-safe so a retried cycle never
//! duplicates aggregated rows.

use super::models::{AlertEvent, DetectionRecord, DeviceRecord, TrackSummary, WindowTags};
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn upsert_window_tags(&self, summary: &WindowTags) -> Result<(), PersistenceError>;

    async fn replace_top_tracks(
        &self,
        device_id: &str,
        tracks: &[TrackSummary],
    ) -> Result<(), PersistenceError>;

    async fn upsert_zones(
        &self,
        device_id: &str,
        zones: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;

    async fn insert_detection_batch(&self, batch: &[DetectionRecord]) -> Result<(), PersistenceError>;

    async fn upsert_event(&self, event: &AlertEvent) -> Result<(), PersistenceError>;

    async fn replace_device_list(&self, devices: &[DeviceRecord]) -> Result<(), PersistenceError>;
}
