//! Remote data service interface
//!
//! Two seams, both traits so the pipelines can run against test doubles:
//! - `QueryTransport` - `query(name, variables) -> data` (HTTP GraphQL)
//! - `SubscriptionTransport` - `subscribe(name, variables) -> event stream` (graphql-transport-ws)

pub mod client;
pub mod subscription;
pub mod types;

use crate::error::ApiError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};

pub use client::WorldsClient;
pub use subscription::WsSubscriber;
pub use types::{DetectionActivityEvent, Page, PageInfo, TrackNode};

/// Events from one live subscription. `Err` items are terminal; the stream
/// ending (`None`) is a graceful close.
pub type EventStream = BoxStream<'static, Result<Value, ApiError>>;

#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Execute the named query document and return the `data` object
    async fn query(&self, name: &str, variables: Value) -> Result<Value, ApiError>;
}

#[async_trait]
pub trait SubscriptionTransport: Send + Sync {
    /// Open a subscription; resolves once the server accepted it
    async fn subscribe(&self, name: &str, variables: Value) -> Result<EventStream, ApiError>;
}

/// `{filter: {}, first: 50, after: null, sort: []}`
pub fn default_variables() -> Value {
    json!({
        "filter": {},
        "first": 50,
        "after": null,
        "sort": []
    })
}
