//! Subscription supervisor
//!
//! Owns the live feed for its whole lifetime:
//!
//! ```text
//! Connecting -> Streaming -> (Disconnected | Errored) -> Backoff -> Connecting
//! ```
//!
//! Every decoded event is offered to the ingestion queue. Events carrying the
//! alert tag additionally produce an `AlertEvent` that is written to the
//! gateway before the next event is read, whether or not the queue accepted
//! the event. At most one subscription is open at any time: the previous
//! stream is dropped before the backoff starts.

use super::alerts::AlertPolicy;
use super::queue::QueueProducer;
use crate::api::types::DetectionActivityEvent;
use crate::api::{EventStream, SubscriptionTransport};
use crate::storage::PersistenceGateway;
use chrono::Utc;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DETECTION_SUBSCRIPTION: &str = "detectionActivity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Connecting,
    Streaming,
    Disconnected,
    Errored,
    Backoff,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SupervisorStats {
    pub connections: u64,
    pub connect_failures: u64,
    pub events_received: u64,
    pub events_enqueued: u64,
    pub decode_failures: u64,
    pub alerts_raised: u64,
    pub alert_failures: u64,
}

pub struct SubscriptionSupervisor {
    transport: Arc<dyn SubscriptionTransport>,
    gateway: Arc<dyn PersistenceGateway>,
    producer: QueueProducer<DetectionActivityEvent>,
    alerts: AlertPolicy,
    backoff: Duration,
    variables: Value,
    stats: SupervisorStats,
}

impl SubscriptionSupervisor {
    pub fn new(
        transport: Arc<dyn SubscriptionTransport>,
        gateway: Arc<dyn PersistenceGateway>,
        producer: QueueProducer<DetectionActivityEvent>,
        alerts: AlertPolicy,
        backoff: Duration,
    ) -> Self {
        Self {
            transport,
            gateway,
            producer,
            alerts,
            backoff,
            variables: json!({ "filter": {} }),
            stats: SupervisorStats::default(),
        }
    }

    /// Reconnect forever until `shutdown` fires. The backoff wait and an open
    /// stream are both interrupted by shutdown; dropping the supervisor then
    /// releases its queue producer so the flusher can drain and exit.
    pub async fn run(mut self, shutdown: CancellationToken) -> SupervisorStats {
        log::info!("🌍 Starting subscription supervisor");
        log::info!("   ├─ Subscription: {}", DETECTION_SUBSCRIPTION);
        log::info!("   ├─ Alert tag: {}", self.alerts.tag);
        log::info!("   └─ Reconnect backoff: {}s", self.backoff.as_secs());

        let mut state = SupervisorState::Connecting;
        let mut stream: Option<EventStream> = None;

        loop {
            state = match state {
                SupervisorState::Connecting => {
                    log::info!("🔌 Connecting to {} subscription...", DETECTION_SUBSCRIPTION);
                    let connect = self
                        .transport
                        .subscribe(DETECTION_SUBSCRIPTION, self.variables.clone());
                    let result = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        result = connect => result,
                    };

                    match result {
                        Ok(s) => {
                            self.stats.connections += 1;
                            log::info!("✅ Subscription established");
                            stream = Some(s);
                            SupervisorState::Streaming
                        }
                        Err(e) => {
                            self.stats.connect_failures += 1;
                            log::error!("❌ Subscription connect failed: {}", e);
                            SupervisorState::Errored
                        }
                    }
                }
                SupervisorState::Streaming => {
                    let Some(active) = stream.as_mut() else {
                        break;
                    };
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        next = active.next() => next,
                    };

                    match next {
                        Some(Ok(payload)) => {
                            self.handle_event(payload).await;
                            SupervisorState::Streaming
                        }
                        Some(Err(e)) => {
                            log::error!("❌ Subscription connection lost: {}", e);
                            SupervisorState::Errored
                        }
                        None => {
                            log::warn!("⚠️  Subscription ended gracefully");
                            SupervisorState::Disconnected
                        }
                    }
                }
                SupervisorState::Disconnected | SupervisorState::Errored => {
                    stream = None;
                    SupervisorState::Backoff
                }
                SupervisorState::Backoff => {
                    log::info!("⏳ Reconnecting in {}s", self.backoff.as_secs());
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                    SupervisorState::Connecting
                }
            };
        }

        drop(stream);
        log::info!(
            "🛑 Subscription supervisor stopped: {} connections, {} events, {} dropped, {} alerts",
            self.stats.connections,
            self.stats.events_received,
            self.producer.dropped(),
            self.stats.alerts_raised
        );
        self.stats
    }

    async fn handle_event(&mut self, payload: Value) {
        self.stats.events_received += 1;

        let event: DetectionActivityEvent = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_failures += 1;
                log::error!("❌ Undecodable detection event: {}", e);
                return;
            }
        };

        let alert = self.alerts.alert_for(&event, Utc::now());

        if self.producer.offer(event) {
            self.stats.events_enqueued += 1;
        }
        log::debug!("-> Event queued (queue size: {})", self.producer.len());

        if let Some(alert) = alert {
            match self.gateway.upsert_event(&alert).await {
                Ok(()) => {
                    self.stats.alerts_raised += 1;
                    log::info!("🚨 Saved {} alert {}", alert.sub_type, alert.id);
                }
                Err(e) => {
                    self.stats.alert_failures += 1;
                    log::error!("❌ Failed to save alert: {}", e);
                }
            }
        }
    }
}
