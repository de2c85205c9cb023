//! In-memory `PersistenceGateway` that records every call
//!
//! Used by the pipeline tests and the integration suite. `set_failing(true)`
//! makes every write return a `PersistenceError` so failure paths can be
//! exercised.

use super::gateway::PersistenceGateway;
use super::models::{AlertEvent, DetectionRecord, DeviceRecord, TrackSummary, WindowTags};
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub window_tags: Vec<WindowTags>,
    pub top_tracks: Vec<(String, Vec<TrackSummary>)>,
    pub zones: Vec<(String, Vec<String>, DateTime<Utc>)>,
    pub detection_batches: Vec<Vec<DetectionRecord>>,
    pub events: Vec<AlertEvent>,
    pub device_lists: Vec<Vec<DeviceRecord>>,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    recorded: Mutex<Recorded>,
    failing: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of everything written so far
    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn write<F: FnOnce(&mut Recorded)>(&self, f: F) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Database("simulated write failure".to_string()));
        }
        let mut recorded = self
            .recorded
            .lock()
            .map_err(|_| PersistenceError::Database("recorder mutex poisoned".to_string()))?;
        f(&mut recorded);
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn upsert_window_tags(&self, summary: &WindowTags) -> Result<(), PersistenceError> {
        self.write(|r| r.window_tags.push(summary.clone()))
    }

    async fn replace_top_tracks(
        &self,
        device_id: &str,
        tracks: &[TrackSummary],
    ) -> Result<(), PersistenceError> {
        self.write(|r| r.top_tracks.push((device_id.to_string(), tracks.to_vec())))
    }

    async fn upsert_zones(
        &self,
        device_id: &str,
        zones: &[String],
        timestamp: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.write(|r| r.zones.push((device_id.to_string(), zones.to_vec(), timestamp)))
    }

    async fn insert_detection_batch(&self, batch: &[DetectionRecord]) -> Result<(), PersistenceError> {
        self.write(|r| r.detection_batches.push(batch.to_vec()))
    }

    async fn upsert_event(&self, event: &AlertEvent) -> Result<(), PersistenceError> {
        self.write(|r| r.events.push(event.clone()))
    }

    async fn replace_device_list(&self, devices: &[DeviceRecord]) -> Result<(), PersistenceError> {
        self.write(|r| r.device_lists.push(devices.to_vec()))
    }
}
