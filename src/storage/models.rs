//! Storage-ready records handed to the persistence gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One histogram entry for a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

impl TagCount {
    pub fn new(tag: impl Into<String>, count: u64) -> Self {
        Self { tag: tag.into(), count }
    }
}

/// Tag histogram for one device and window end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowTags {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<TagCount>,
}

/// Per-track summary built during window aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds between start and end; 0.0 when either is unparsable
    pub duration_secs: f64,
    pub detections: usize,
    pub tag: String,
    pub thumbnail_url: Option<String>,
    pub mean_confidence: Option<f64>,
    /// Sorted, deduplicated zone names
    pub zones: Vec<String>,
}

/// Validated detection-activity row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub source_name: String,
    pub tag: Option<String>,
    pub event_count: i64,
}

/// Standalone alert raised for a high-priority tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub event_producer_id: String,
    pub event_type: String,
    pub sub_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub metadata: Value,
    pub draft: bool,
    pub priority: String,
}

/// Device with its data source attributes flattened in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: Option<String>,
    pub attributes: Map<String, Value>,
}
