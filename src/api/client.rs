//! HTTP GraphQL client for the Worlds API
//!
//! Query documents live on disk as `<queries_dir>/<name>.graphql` and are
//! posted as `{query, variables}` with the token headers attached.

use super::types::GraphQlResponse;
use super::QueryTransport;
use crate::config::ApiConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub struct WorldsClient {
    http: reqwest::Client,
    api_url: String,
    queries_dir: PathBuf,
}

impl WorldsClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-token-id", header_value(&config.token_id)?);
        headers.insert("x-token-value", header_value(&config.token_value)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            queries_dir: PathBuf::from(&config.queries_dir),
        })
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(raw)
        .map_err(|e| ApiError::Protocol(format!("invalid header value: {}", e)))
}

/// Read `<dir>/<name>.graphql`
pub fn load_document(dir: &Path, name: &str) -> Result<String, ApiError> {
    let path = dir.join(format!("{}.graphql", name));
    fs::read_to_string(&path)
        .map_err(|e| ApiError::Protocol(format!("query file {} unreadable: {}", path.display(), e)))
}

#[async_trait]
impl QueryTransport for WorldsClient {
    async fn query(&self, name: &str, variables: Value) -> Result<Value, ApiError> {
        let document = load_document(&self.queries_dir, name)?;
        let payload = json!({ "query": document, "variables": variables });

        let response = self.http.post(&self.api_url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(ApiError::Transport(format!(
                "{} returned HTTP {}",
                name,
                response.status()
            )));
        }

        let body: GraphQlResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Protocol(format!("undecodable response body: {}", e)))?;

        body.into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_load_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tracks.graphql"), "query Tracks { tracks { edges { node { id } } } }").unwrap();

        let doc = load_document(dir.path(), "tracks").unwrap();
        assert!(doc.starts_with("query Tracks"));

        let missing = load_document(dir.path(), "devices");
        assert!(matches!(missing, Err(ApiError::Protocol(_))));
    }

    #[test]
    fn test_client_rejects_bad_token() {
        let config = ApiConfig {
            api_url: "https://api.example.test/graphql".to_string(),
            ws_url: "wss://api.example.test/graphql".to_string(),
            token_id: "id".to_string(),
            token_value: "bad\nvalue".to_string(),
            queries_dir: "queries".to_string(),
            http_timeout: Duration::from_secs(5),
        };
        assert!(WorldsClient::new(&config).is_err());
    }
}
