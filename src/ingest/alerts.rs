//! High-priority tag side channel
//!
//! Activity whose tag matches the configured alert tag produces a standalone
//! `AlertEvent`, written straight to the gateway outside of batching.

use crate::api::types::DetectionActivityEvent;
use crate::storage::models::AlertEvent;
use crate::timestamps::parse_iso8601;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

pub const ALERT_EVENT_TYPE: &str = "object-of-interest";
pub const ALERT_PRIORITY: &str = "high";

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub tag: String,
    pub producer_id: String,
}

impl AlertPolicy {
    pub fn new(tag: impl Into<String>, producer_id: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            producer_id: producer_id.into(),
        }
    }

    pub fn matches(&self, event: &DetectionActivityEvent) -> bool {
        event.tag() == Some(self.tag.as_str())
    }

    /// Build the alert for a matching event; `None` otherwise. The alert is
    /// instantaneous: start and end are the detection time (or `now`).
    pub fn alert_for(&self, event: &DetectionActivityEvent, now: DateTime<Utc>) -> Option<AlertEvent> {
        if !self.matches(event) {
            return None;
        }

        let at = event.timestamp().and_then(parse_iso8601).unwrap_or(now);
        let source = event
            .detection_activity
            .as_ref()
            .and_then(|a| a.track.as_ref())
            .and_then(|t| t.data_source.as_ref());

        Some(AlertEvent {
            id: Uuid::new_v4().to_string(),
            event_producer_id: self.producer_id.clone(),
            event_type: ALERT_EVENT_TYPE.to_string(),
            sub_type: self.tag.clone(),
            start_time: at,
            end_time: at,
            metadata: json!({
                "notes": format!("Detected {}", self.tag.replace('_', " ")),
                "source_id": source.and_then(|s| s.id.clone()),
                "source_name": source.and_then(|s| s.name.clone()),
            }),
            draft: false,
            priority: ALERT_PRIORITY.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(tag: &str, timestamp: Option<&str>) -> DetectionActivityEvent {
        serde_json::from_value(json!({"detectionActivity": {
            "timestamp": timestamp,
            "track": {"tag": tag, "dataSource": {"id": "ds-1", "name": "Cam 1"}}
        }}))
        .unwrap()
    }

    fn policy() -> AlertPolicy {
        AlertPolicy::new("yellow_vest", "producer-1")
    }

    #[test]
    fn test_matching_tag_builds_alert() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let alert = policy()
            .alert_for(&event("yellow_vest", Some("2025-03-01T10:00:00Z")), now)
            .unwrap();

        let at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(alert.start_time, at);
        assert_eq!(alert.end_time, at);
        assert_eq!(alert.event_type, ALERT_EVENT_TYPE);
        assert_eq!(alert.sub_type, "yellow_vest");
        assert_eq!(alert.event_producer_id, "producer-1");
        assert_eq!(alert.priority, "high");
        assert!(!alert.draft);
        assert_eq!(alert.metadata["source_id"], json!("ds-1"));
        assert!(Uuid::parse_str(&alert.id).is_ok());
    }

    #[test]
    fn test_other_tags_ignored() {
        assert!(policy().alert_for(&event("person", None), Utc::now()).is_none());
    }

    #[test]
    fn test_missing_timestamp_uses_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let alert = policy().alert_for(&event("yellow_vest", None), now).unwrap();
        assert_eq!(alert.start_time, now);
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let e = event("yellow_vest", None);
        let a = policy().alert_for(&e, Utc::now()).unwrap();
        let b = policy().alert_for(&e, Utc::now()).unwrap();
        assert_ne!(a.id, b.id);
    }
}
