//! Wire types for the remote GraphQL API
//!
//! Responses are loosely typed (nested maps where any key may be missing or
//! null). Everything is decoded once here into optional-field structs so the
//! aggregation and ingestion code never re-checks raw JSON.

use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{data, errors?}` envelope returned by every query
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    #[serde(default)]
    pub message: String,
}

impl GraphQlResponse {
    /// Fail with `Protocol` when the server reported errors or sent no data
    pub fn into_data(self) -> Result<Value, ApiError> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(ApiError::Protocol(format!("server errors: {}", messages.join("; "))));
        }
        self.data
            .filter(|d| !d.is_null())
            .ok_or_else(|| ApiError::Protocol("response carried no data".to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    #[serde(default)]
    node: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection {
    #[serde(default, deserialize_with = "null_as_empty")]
    edges: Vec<Edge>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

/// One page of a cursor-paginated collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    /// Nodes on this page that did not decode into `T`
    pub rejected: usize,
    pub has_next: bool,
    pub end_cursor: Option<String>,
}

impl<T: DeserializeOwned> Page<T> {
    /// Decode the connection stored under the single top-level data key:
    /// `{<key>: {edges: [{node}], pageInfo: {hasNextPage, endCursor}}}`.
    ///
    /// Edges with a null node are skipped. Nodes are decoded one by one, so a
    /// malformed node is logged and counted in `rejected` without failing
    /// the page. A missing `pageInfo` reads as "no next page".
    pub fn from_data(data: Value) -> Result<Self, ApiError> {
        let connection = match data {
            Value::Object(map) => map
                .into_iter()
                .next()
                .map(|(_, v)| v)
                .ok_or_else(|| ApiError::Protocol("data object is empty".to_string()))?,
            other => {
                return Err(ApiError::Protocol(format!("expected data object, got {}", other)));
            }
        };

        let connection: Connection = serde_json::from_value(connection)?;
        let page_info = connection.page_info.unwrap_or_default();

        let mut records = Vec::with_capacity(connection.edges.len());
        let mut rejected = 0;
        for node in connection.edges.into_iter().map(|e| e.node) {
            if node.is_null() {
                continue;
            }
            match serde_json::from_value::<T>(node) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::warn!("⚠️  Skipping malformed record: {}", e);
                    rejected += 1;
                }
            }
        }

        Ok(Self {
            records,
            rejected,
            has_next: page_info.has_next_page,
            end_cursor: page_info.end_cursor,
        })
    }
}

/// Interval-bounded activity record from the `tracks` query
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    /// Non-string values read as absent
    #[serde(default, deserialize_with = "string_or_none")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "string_or_none")]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detections: Vec<DetectionNode>,
    #[serde(default)]
    pub video: Option<VideoNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionNode {
    /// Free-form JSON; only `track_confidence` is read
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub zones: Vec<ZoneNode>,
}

impl DetectionNode {
    /// Numeric `metadata.track_confidence`, if present
    pub fn confidence(&self) -> Option<f64> {
        self.metadata.as_ref()?.get("track_confidence")?.as_f64()
    }

    pub fn zone_names(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().filter_map(|z| z.name.as_deref()).filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ZoneNode {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoNode {
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Subscription payload: `{detectionActivity: {timestamp, track: {tag, dataSource}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionActivityEvent {
    #[serde(default)]
    pub detection_activity: Option<DetectionActivity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionActivity {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub track: Option<ActivityTrack>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTrack {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub data_source: Option<DataSourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSourceRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl DetectionActivityEvent {
    pub fn tag(&self) -> Option<&str> {
        self.detection_activity
            .as_ref()
            .and_then(|a| a.track.as_ref())
            .and_then(|t| t.tag.as_deref())
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.detection_activity.as_ref().and_then(|a| a.timestamp.as_deref())
    }
}

/// Device node from the `devices` query. Kept as a raw map because the set
/// of attributes varies by data source.
pub type DeviceNode = Map<String, Value>;

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}
