//! Per-window track aggregation
//!
//! A `WindowAccumulator` is built fresh at the start of each poll cycle,
//! fed pages in cursor order, and consumed by `finish` at the end of the
//! cycle. Nothing here is shared across cycles.

use crate::api::types::TrackNode;
use crate::error::ValidationError;
use crate::storage::models::{TagCount, TrackSummary, WindowTags};
use crate::timestamps::duration_secs;
use chrono::{DateTime, Timelike, Utc};
use std::collections::{BTreeSet, HashMap};

pub const UNKNOWN_TAG: &str = "unknown";

/// End-of-cycle output for one device window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSummary {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Count descending, ties by tag ascending
    pub tag_counts: Vec<TagCount>,
    /// Longest first, ties by first-seen order
    pub top_tracks: Vec<TrackSummary>,
    /// Sorted union of every track's zones
    pub zones: Vec<String>,
    /// Tracks counted in `tag_counts`
    pub records_processed: usize,
    /// Tracks missing from `top_tracks`: no id, or undecodable on the wire
    pub records_rejected: usize,
}

impl WindowSummary {
    pub fn window_tags(&self) -> WindowTags {
        WindowTags {
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            tags: self.tag_counts.clone(),
        }
    }
}

#[derive(Debug)]
pub struct WindowAccumulator {
    device_id: String,
    timestamp: DateTime<Utc>,
    tag_counts: HashMap<String, u64>,
    /// id -> (first-seen sequence, latest summary)
    tracks: HashMap<String, (usize, TrackSummary)>,
    next_seq: usize,
    zones: BTreeSet<String>,
    records_processed: usize,
    records_rejected: usize,
}

impl WindowAccumulator {
    /// `timestamp` is the window end, truncated to whole seconds
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: timestamp.with_nanosecond(0).unwrap_or(timestamp),
            tag_counts: HashMap::new(),
            tracks: HashMap::new(),
            next_seq: 0,
            zones: BTreeSet::new(),
            records_processed: 0,
            records_rejected: 0,
        }
    }

    pub fn records_processed(&self) -> usize {
        self.records_processed
    }

    /// Fold a page of tracks in order. A track without an id still counts
    /// towards tags and zones but is left out of the top tracks.
    pub fn add_page(&mut self, records: Vec<TrackNode>) {
        for record in records {
            if let Err(e) = self.add_track(record) {
                log::warn!("⚠️  Track for {} left out of top tracks: {}", self.device_id, e);
            }
        }
    }

    /// Records that never decoded into a `TrackNode`
    pub fn add_undecodable(&mut self, count: usize) {
        self.records_rejected += count;
    }

    pub fn add_track(&mut self, record: TrackNode) -> Result<(), ValidationError> {
        let tag = record.tag.unwrap_or_else(|| UNKNOWN_TAG.to_string());
        let duration = duration_secs(record.start_time.as_deref(), record.end_time.as_deref());

        let confidences: Vec<f64> = record.detections.iter().filter_map(|d| d.confidence()).collect();
        let mean_confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        let zones: BTreeSet<String> = record
            .detections
            .iter()
            .flat_map(|d| d.zone_names())
            .map(str::to_string)
            .collect();
        self.zones.extend(zones.iter().cloned());

        *self.tag_counts.entry(tag.clone()).or_insert(0) += 1;
        self.records_processed += 1;

        let Some(id) = record.id.filter(|id| !id.is_empty()) else {
            self.records_rejected += 1;
            return Err(ValidationError::MissingField("id"));
        };

        let summary = TrackSummary {
            id: id.clone(),
            device_id: self.device_id.clone(),
            timestamp: self.timestamp,
            duration_secs: duration,
            detections: record.detections.len(),
            tag,
            thumbnail_url: record.video.and_then(|v| v.thumbnail_url),
            mean_confidence,
            zones: zones.into_iter().collect(),
        };

        // A repeated id overwrites but keeps its first-seen position
        match self.tracks.get_mut(&id) {
            Some(entry) => entry.1 = summary,
            None => {
                self.tracks.insert(id, (self.next_seq, summary));
                self.next_seq += 1;
            }
        }

        Ok(())
    }

    /// Reduce to the storage-ready summary
    pub fn finish(self, max_top_tracks: usize) -> WindowSummary {
        let mut tag_counts: Vec<TagCount> = self
            .tag_counts
            .into_iter()
            .map(|(tag, count)| TagCount { tag, count })
            .collect();
        tag_counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));

        let mut tracks: Vec<(usize, TrackSummary)> = self.tracks.into_values().collect();
        tracks.sort_by_key(|(seq, _)| *seq);
        // Stable sort keeps first-seen order among equal durations
        tracks.sort_by(|(_, a), (_, b)| b.duration_secs.total_cmp(&a.duration_secs));
        let top_tracks = tracks
            .into_iter()
            .take(max_top_tracks)
            .map(|(_, summary)| summary)
            .collect();

        WindowSummary {
            device_id: self.device_id,
            timestamp: self.timestamp,
            tag_counts,
            top_tracks,
            zones: self.zones.into_iter().collect(),
            records_processed: self.records_processed,
            records_rejected: self.records_rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{DetectionNode, VideoNode, ZoneNode};
    use chrono::TimeZone;
    use serde_json::json;

    fn window_end() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_003_600, 0).unwrap()
    }

    fn track(id: &str, tag: Option<&str>, duration_secs: i64) -> TrackNode {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let end = start + chrono::Duration::seconds(duration_secs);
        TrackNode {
            id: Some(id.to_string()),
            tag: tag.map(str::to_string),
            start_time: Some(start.to_rfc3339()),
            end_time: Some(end.to_rfc3339()),
            detections: Vec::new(),
            video: None,
        }
    }

    fn detection(confidence: Option<f64>, zones: &[&str]) -> DetectionNode {
        DetectionNode {
            metadata: confidence.map(|c| json!({ "track_confidence": c })),
            zones: zones
                .iter()
                .map(|z| ZoneNode { name: Some(z.to_string()) })
                .collect(),
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        acc.add_page(vec![
            track("t1", Some("car"), 10),
            track("t2", Some("car"), 25),
            track("t3", Some("person"), 5),
        ]);

        let summary = acc.finish(2);
        assert_eq!(
            summary.tag_counts,
            vec![TagCount::new("car", 2), TagCount::new("person", 1)]
        );
        let top: Vec<(&str, f64)> = summary
            .top_tracks
            .iter()
            .map(|t| (t.id.as_str(), t.duration_secs))
            .collect();
        assert_eq!(top, vec![("t2", 25.0), ("t1", 10.0)]);
    }

    #[test]
    fn test_tag_sum_matches_processed_records() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        let tags = ["car", "person", "bike", "car", "truck", "person", "car"];
        let records: Vec<TrackNode> = tags
            .iter()
            .enumerate()
            .map(|(i, t)| track(&format!("t{}", i), Some(t), i as i64))
            .collect();
        acc.add_page(records);

        let summary = acc.finish(5);
        let total: u64 = summary.tag_counts.iter().map(|t| t.count).sum();
        assert_eq!(total as usize, tags.len());
        assert_eq!(summary.records_processed, tags.len());
    }

    #[test]
    fn test_tag_ordering_is_deterministic() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        acc.add_page(vec![
            track("a", Some("zebra"), 1),
            track("b", Some("apple"), 1),
            track("c", Some("mango"), 1),
            track("d", Some("mango"), 1),
        ]);

        let tags: Vec<String> = acc.finish(5).tag_counts.into_iter().map(|t| t.tag).collect();
        assert_eq!(tags, vec!["mango", "apple", "zebra"]);
    }

    #[test]
    fn test_missing_tag_defaults_to_unknown() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        acc.add_page(vec![track("a", None, 3)]);

        let summary = acc.finish(5);
        assert_eq!(summary.tag_counts, vec![TagCount::new(UNKNOWN_TAG, 1)]);
        assert_eq!(summary.top_tracks[0].tag, UNKNOWN_TAG);
    }

    #[test]
    fn test_unparsable_duration_kept_as_zero() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        let mut broken = track("broken", Some("car"), 0);
        broken.end_time = Some("not a time".to_string());
        acc.add_page(vec![broken, track("ok", Some("car"), 7)]);

        let summary = acc.finish(5);
        assert_eq!(summary.records_processed, 2);
        assert_eq!(summary.tag_counts, vec![TagCount::new("car", 2)]);
        let broken = summary.top_tracks.iter().find(|t| t.id == "broken").unwrap();
        assert_eq!(broken.duration_secs, 0.0);
    }

    #[test]
    fn test_track_without_id_counted_in_tags() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        let mut anonymous = track("x", Some("car"), 4);
        anonymous.id = None;
        assert_eq!(
            WindowAccumulator::new("dev", window_end()).add_track(anonymous.clone()),
            Err(ValidationError::MissingField("id"))
        );

        acc.add_page(vec![anonymous, track("y", Some("car"), 4)]);
        let summary = acc.finish(5);
        assert_eq!(summary.tag_counts, vec![TagCount::new("car", 2)]);
        assert_eq!(summary.records_processed, 2);
        assert_eq!(summary.records_rejected, 1);
        let ids: Vec<&str> = summary.top_tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["y"]);
    }

    #[test]
    fn test_track_without_id_keeps_its_zones() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        let mut anonymous = track("x", Some("person"), 2);
        anonymous.id = Some(String::new());
        anonymous.detections = vec![detection(None, &["gate"])];
        acc.add_page(vec![anonymous]);

        let summary = acc.finish(5);
        assert_eq!(summary.tag_counts, vec![TagCount::new("person", 1)]);
        assert_eq!(summary.zones, vec!["gate"]);
        assert!(summary.top_tracks.is_empty());
    }

    #[test]
    fn test_confidence_and_zones() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        let mut t = track("t", Some("person"), 12);
        t.detections = vec![
            detection(Some(0.5), &["north", "gate"]),
            detection(None, &["gate"]),
            detection(Some(1.0), &[]),
        ];
        t.video = Some(VideoNode {
            thumbnail_url: Some("https://thumbs/t.jpg".to_string()),
        });
        let mut bare = track("bare", Some("person"), 1);
        bare.detections = vec![detection(None, &["south"])];
        acc.add_page(vec![t, bare]);

        let summary = acc.finish(5);
        let t = &summary.top_tracks[0];
        assert_eq!(t.detections, 3);
        assert_eq!(t.mean_confidence, Some(0.75));
        assert_eq!(t.zones, vec!["gate", "north"]);
        assert_eq!(t.thumbnail_url.as_deref(), Some("https://thumbs/t.jpg"));

        let bare = &summary.top_tracks[1];
        assert_eq!(bare.mean_confidence, None);
        assert_eq!(summary.zones, vec!["gate", "north", "south"]);
    }

    #[test]
    fn test_zone_union_is_idempotent() {
        let page = || {
            let mut t = track("t", Some("car"), 3);
            t.detections = vec![detection(None, &["b", "a"]), detection(None, &["a"])];
            let mut u = track("u", Some("car"), 3);
            u.detections = vec![detection(None, &["c"])];
            vec![t, u]
        };

        let mut once = WindowAccumulator::new("dev", window_end());
        once.add_page(page());
        let mut twice = WindowAccumulator::new("dev", window_end());
        twice.add_page(page());
        twice.add_page(page());

        assert_eq!(once.finish(5).zones, twice.finish(5).zones);
    }

    #[test]
    fn test_repeated_id_overwrites_in_place() {
        let mut acc = WindowAccumulator::new("dev", window_end());
        acc.add_page(vec![track("a", Some("car"), 10), track("b", Some("car"), 10)]);
        acc.add_page(vec![track("a", Some("car"), 10)]);

        let summary = acc.finish(5);
        let ids: Vec<&str> = summary.top_tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_top_n_properties() {
        let durations = [7, 3, 9, 9, 1, 12, 3, 0, 9];
        let mut acc = WindowAccumulator::new("dev", window_end());
        acc.add_page(
            durations
                .iter()
                .enumerate()
                .map(|(i, d)| track(&format!("t{}", i), Some("car"), *d))
                .collect(),
        );

        for n in [0usize, 1, 3, 4, 20] {
            let mut acc_n = WindowAccumulator::new("dev", window_end());
            acc_n.add_page(
                durations
                    .iter()
                    .enumerate()
                    .map(|(i, d)| track(&format!("t{}", i), Some("car"), *d))
                    .collect(),
            );
            let top = acc_n.finish(n).top_tracks;

            assert_eq!(top.len(), n.min(durations.len()));
            assert!(top.windows(2).all(|w| w[0].duration_secs >= w[1].duration_secs));
            if let Some(min_included) = top.last().map(|t| t.duration_secs) {
                let included: Vec<&str> = top.iter().map(|t| t.id.as_str()).collect();
                for (i, d) in durations.iter().enumerate() {
                    if !included.contains(&format!("t{}", i).as_str()) {
                        assert!(*d as f64 <= min_included);
                    }
                }
            }
        }

        // Ties on 9 resolve by first-seen order
        let top: Vec<String> = acc.finish(4).top_tracks.into_iter().map(|t| t.id).collect();
        assert_eq!(top, vec!["t5", "t2", "t3", "t8"]);
    }

    #[test]
    fn test_timestamp_truncated_to_seconds() {
        let end = Utc.timestamp_opt(1_700_003_600, 987_000_000).unwrap();
        let acc = WindowAccumulator::new("dev", end);
        assert_eq!(acc.finish(1).timestamp, window_end());
    }
}
