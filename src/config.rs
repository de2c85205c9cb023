//! Runtime configuration from environment variables
//!
//! Call `dotenv::dotenv().ok()` before `AppConfig::from_env()` so a local
//! `.env` file is honoured.

use crate::error::ConfigError;
use std::env;
use std::time::Duration;

const DEFAULT_DEVICE_ID: &str = "4ae953d5-d3a6-4f70-8b5a-0873a40f518b";
const DEFAULT_ALERT_PRODUCER_ID: &str = "1514aad2-bd89-42ab-8831-3ec75866a929";

/// Remote API endpoints and credentials
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_url: String,
    pub ws_url: String,
    pub token_id: String,
    pub token_value: String,
    /// Directory holding `<name>.graphql` documents
    pub queries_dir: String,
    pub http_timeout: Duration,
}

/// Poll-cycle window aggregation settings
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub device_ids: Vec<String>,
    pub device_address_filter: String,
    pub poll_interval: Duration,
    pub window_minutes: i64,
    pub top_tracks: usize,
    pub page_size: usize,
    /// Hard bound on pages fetched per traversal
    pub max_pages: usize,
}

/// Live ingestion settings
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub queue_capacity: usize,
    pub batch_max_size: usize,
    pub idle_flush: Duration,
    pub reconnect_backoff: Duration,
    pub alert_tag: String,
    pub alert_producer_id: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub dashboard: DashboardConfig,
    pub ingest: IngestConfig,
    pub db_path: String,
    pub schema_dir: String,
    pub rust_log: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            device_ids: vec![DEFAULT_DEVICE_ID.to_string()],
            device_address_filter: "earthcam".to_string(),
            poll_interval: Duration::from_secs(3600),
            window_minutes: 60,
            top_tracks: 5,
            page_size: 50,
            max_pages: 1000,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_max_size: 300,
            idle_flush: Duration::from_secs(30),
            reconnect_backoff: Duration::from_secs(15),
            alert_tag: "yellow_vest".to_string(),
            alert_producer_id: DEFAULT_ALERT_PRODUCER_ID.to_string(),
        }
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVariable(name.to_string()))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

impl ApiConfig {
    /// Environment variables:
    /// - `WORLDS_API_URL`, `WORLDS_WS_URL` (required)
    /// - `WORLDS_TOKEN_ID`, `WORLDS_TOKEN_VALUE` (required)
    /// - `TRACKFLOW_QUERIES_DIR` (default: queries)
    /// - `HTTP_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: required("WORLDS_API_URL")?,
            ws_url: required("WORLDS_WS_URL")?,
            token_id: required("WORLDS_TOKEN_ID")?,
            token_value: required("WORLDS_TOKEN_VALUE")?,
            queries_dir: env::var("TRACKFLOW_QUERIES_DIR").unwrap_or_else(|_| "queries".to_string()),
            http_timeout: Duration::from_secs(parsed("HTTP_TIMEOUT_SECS", 30)),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "WORLDS_API_URL must start with http:// or https://".to_string(),
            ));
        }
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "WORLDS_WS_URL must start with ws:// or wss://".to_string(),
            ));
        }
        Ok(())
    }
}

impl DashboardConfig {
    /// Environment variables:
    /// - `DASHBOARD_DEVICE_IDS` (comma-separated)
    /// - `DEVICE_ADDRESS_FILTER` (default: earthcam)
    /// - `POLL_INTERVAL_SECS` (default: 3600)
    /// - `WINDOW_MINUTES` (default: 60)
    /// - `TOP_TRACKS` (default: 5)
    /// - `PAGE_SIZE` (default: 50)
    /// - `MAX_PAGES` (default: 1000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let device_ids = env::var("DASHBOARD_DEVICE_IDS")
            .map(|s| comma_list(&s))
            .ok()
            .filter(|ids| !ids.is_empty())
            .unwrap_or(defaults.device_ids);

        Self {
            device_ids,
            device_address_filter: env::var("DEVICE_ADDRESS_FILTER")
                .unwrap_or(defaults.device_address_filter),
            poll_interval: Duration::from_secs(parsed("POLL_INTERVAL_SECS", 3600)),
            window_minutes: parsed("WINDOW_MINUTES", defaults.window_minutes),
            top_tracks: parsed("TOP_TRACKS", defaults.top_tracks),
            page_size: parsed("PAGE_SIZE", defaults.page_size),
            max_pages: parsed("MAX_PAGES", defaults.max_pages),
        }
    }
}

impl IngestConfig {
    /// Environment variables:
    /// - `INGEST_QUEUE_CAPACITY` (default: 10000)
    /// - `BATCH_MAX_SIZE` (default: 300)
    /// - `IDLE_FLUSH_SECS` (default: 30)
    /// - `RECONNECT_BACKOFF_SECS` (default: 15)
    /// - `ALERT_TAG` (default: yellow_vest)
    /// - `ALERT_PRODUCER_ID`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queue_capacity: parsed("INGEST_QUEUE_CAPACITY", defaults.queue_capacity),
            batch_max_size: parsed("BATCH_MAX_SIZE", defaults.batch_max_size),
            idle_flush: Duration::from_secs(parsed("IDLE_FLUSH_SECS", 30)),
            reconnect_backoff: Duration::from_secs(parsed("RECONNECT_BACKOFF_SECS", 15)),
            alert_tag: env::var("ALERT_TAG").unwrap_or(defaults.alert_tag),
            alert_producer_id: env::var("ALERT_PRODUCER_ID").unwrap_or(defaults.alert_producer_id),
        }
    }
}

impl AppConfig {
    /// Load the full configuration; see the per-section `from_env` docs.
    ///
    /// Also reads `TRACKFLOW_DB_PATH` (default: data/trackflow.db),
    /// `TRACKFLOW_SCHEMA_DIR` (default: sql) and `RUST_LOG` (default: info).
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            api: ApiConfig::from_env()?,
            dashboard: DashboardConfig::from_env(),
            ingest: IngestConfig::from_env(),
            db_path: env::var("TRACKFLOW_DB_PATH").unwrap_or_else(|_| "data/trackflow.db".to_string()),
            schema_dir: env::var("TRACKFLOW_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;

        if self.ingest.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue("INGEST_QUEUE_CAPACITY must be > 0".to_string()));
        }
        if self.ingest.batch_max_size == 0 {
            return Err(ConfigError::InvalidValue("BATCH_MAX_SIZE must be > 0".to_string()));
        }
        if self.dashboard.window_minutes <= 0 {
            return Err(ConfigError::InvalidValue("WINDOW_MINUTES must be > 0".to_string()));
        }
        if self.dashboard.page_size == 0 || self.dashboard.max_pages == 0 {
            return Err(ConfigError::InvalidValue(
                "PAGE_SIZE and MAX_PAGES must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> ApiConfig {
        ApiConfig {
            api_url: "https://api.example.test/graphql".to_string(),
            ws_url: "wss://api.example.test/graphql".to_string(),
            token_id: "id".to_string(),
            token_value: "secret".to_string(),
            queries_dir: "queries".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }

    fn app() -> AppConfig {
        AppConfig {
            api: api(),
            dashboard: DashboardConfig::default(),
            ingest: IngestConfig::default(),
            db_path: ":memory:".to_string(),
            schema_dir: "sql".to_string(),
            rust_log: "info".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        let dashboard = DashboardConfig::default();
        assert_eq!(dashboard.poll_interval, Duration::from_secs(3600));
        assert_eq!(dashboard.window_minutes, 60);
        assert_eq!(dashboard.top_tracks, 5);

        let ingest = IngestConfig::default();
        assert_eq!(ingest.batch_max_size, 300);
        assert_eq!(ingest.idle_flush, Duration::from_secs(30));
        assert_eq!(ingest.reconnect_backoff, Duration::from_secs(15));
        assert_eq!(ingest.alert_tag, "yellow_vest");
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(app().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        let mut config = app();
        config.api.api_url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        let mut config = app();
        config.api.ws_url = "https://not-a-socket".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = app();
        config.ingest.batch_max_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let mut config = app();
        config.ingest.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_comma_list_trims_and_skips_empty() {
        assert_eq!(comma_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(comma_list(" , ").is_empty());
    }
}
