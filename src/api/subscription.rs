//! GraphQL subscriptions over WebSocket (`graphql-transport-ws` protocol)
//!
//! Handshake: `connection_init` (token payload) -> `connection_ack` ->
//! `subscribe`. After that every `next` message yields its `payload.data`;
//! `complete` or a close frame ends the stream gracefully, `error` ends it
//! with a protocol error.

use super::client::load_document;
use super::{EventStream, SubscriptionTransport};
use crate::config::ApiConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;

const SUBPROTOCOL: &str = "graphql-transport-ws";
const SUBSCRIPTION_ID: &str = "1";
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Decoded server -> client message
#[derive(Debug, PartialEq)]
pub enum ServerMessage {
    Ack,
    Next(Value),
    Error(String),
    Complete,
    Ping,
    Other,
}

pub fn decode_server_message(text: &str) -> Result<ServerMessage, ApiError> {
    let msg: Value = serde_json::from_str(text)?;
    let kind = msg.get("type").and_then(Value::as_str).unwrap_or_default();

    Ok(match kind {
        "connection_ack" => ServerMessage::Ack,
        "next" => {
            let data = msg
                .get("payload")
                .and_then(|p| p.get("data"))
                .cloned()
                .unwrap_or(Value::Null);
            ServerMessage::Next(data)
        }
        "error" => ServerMessage::Error(
            msg.get("payload").map(Value::to_string).unwrap_or_default(),
        ),
        "complete" => ServerMessage::Complete,
        "ping" => ServerMessage::Ping,
        _ => ServerMessage::Other,
    })
}

pub struct WsSubscriber {
    ws_url: String,
    token_id: String,
    token_value: String,
    queries_dir: PathBuf,
}

impl WsSubscriber {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            ws_url: config.ws_url.clone(),
            token_id: config.token_id.clone(),
            token_value: config.token_value.clone(),
            queries_dir: PathBuf::from(&config.queries_dir),
        }
    }
}

#[async_trait]
impl SubscriptionTransport for WsSubscriber {
    async fn subscribe(&self, name: &str, variables: Value) -> Result<EventStream, ApiError> {
        let document = load_document(&self.queries_dir, name)?;

        let mut request = self.ws_url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));

        let (mut socket, response) = connect_async(request).await?;
        log::debug!("WebSocket connected with status: {}", response.status());

        let init = json!({
            "type": "connection_init",
            "payload": {
                "x-token-id": self.token_id,
                "x-token-value": self.token_value,
            }
        });
        socket.send(Message::Text(init.to_string())).await?;

        // Wait for the ack before subscribing
        let ack = timeout(ACK_TIMEOUT, async {
            while let Some(frame) = socket.next().await {
                if let Message::Text(text) = frame? {
                    match decode_server_message(&text)? {
                        ServerMessage::Ack => return Ok::<(), ApiError>(()),
                        ServerMessage::Error(e) => return Err(ApiError::Protocol(e)),
                        _ => continue,
                    }
                }
            }
            Err(ApiError::Transport("socket closed before connection_ack".to_string()))
        })
        .await
        .map_err(|_| ApiError::Transport("timed out waiting for connection_ack".to_string()))?;
        ack?;

        let subscribe = json!({
            "id": SUBSCRIPTION_ID,
            "type": "subscribe",
            "payload": { "query": document, "variables": variables }
        });
        socket.send(Message::Text(subscribe.to_string())).await?;

        let stream = futures::stream::unfold(Some(socket), |state| async move {
            let mut socket = state?;
            loop {
                let frame = match socket.next().await {
                    None => return None,
                    Some(Err(e)) => return Some((Err(ApiError::from(e)), None)),
                    Some(Ok(frame)) => frame,
                };

                let text = match frame {
                    Message::Text(text) => text,
                    Message::Close(_) => return None,
                    _ => continue,
                };

                match decode_server_message(&text) {
                    Ok(ServerMessage::Next(data)) => return Some((Ok(data), Some(socket))),
                    Ok(ServerMessage::Ping) => {
                        let pong = json!({ "type": "pong" }).to_string();
                        if let Err(e) = socket.send(Message::Text(pong)).await {
                            return Some((Err(ApiError::from(e)), None));
                        }
                    }
                    Ok(ServerMessage::Complete) => return None,
                    Ok(ServerMessage::Error(e)) => return Some((Err(ApiError::Protocol(e)), None)),
                    Ok(ServerMessage::Ack) | Ok(ServerMessage::Other) => {}
                    Err(e) => return Some((Err(e), None)),
                }
            }
        });

        Ok(stream.boxed())
    }
}
