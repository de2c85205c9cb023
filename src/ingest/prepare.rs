//! Detection-activity event -> storage row

use crate::api::types::{DataSourceRef, DetectionActivityEvent};
use crate::error::ValidationError;
use crate::storage::models::DetectionRecord;
use crate::timestamps::parse_iso8601;
use chrono::{DateTime, Utc};

/// Validate one event. Data source id and name are required; a missing
/// timestamp falls back to `now`, an unparsable one rejects the event.
pub fn prepare_detection(
    event: &DetectionActivityEvent,
    now: DateTime<Utc>,
) -> Result<DetectionRecord, ValidationError> {
    let activity = event
        .detection_activity
        .as_ref()
        .ok_or(ValidationError::MissingField("detectionActivity"))?;
    let track = activity.track.as_ref();
    let DataSourceRef { id, name } = track
        .and_then(|t| t.data_source.clone())
        .unwrap_or_default();

    let source_id = id
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingField("source_id"))?;
    let source_name = name
        .filter(|s| !s.is_empty())
        .ok_or(ValidationError::MissingField("source_name"))?;

    let timestamp = match activity.timestamp.as_deref() {
        Some(raw) => {
            parse_iso8601(raw).ok_or_else(|| ValidationError::InvalidTimestamp(raw.to_string()))?
        }
        None => now,
    };

    Ok(DetectionRecord {
        timestamp,
        source_id,
        source_name,
        tag: track.and_then(|t| t.tag.clone()),
        event_count: 1,
    })
}
