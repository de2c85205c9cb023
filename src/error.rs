//! Error taxonomy shared by both pipelines
//!
//! - `ApiError` - remote query/subscription failures (transport vs protocol)
//! - `TraversalError` - a page fetch failed mid-traversal
//! - `ValidationError` - a single record is missing required fields
//! - `PersistenceError` - datastore write failed
//! - `ConfigError` - environment configuration is missing or malformed

use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// Network/HTTP failure talking to the remote API
    Transport(String),
    /// Malformed or error-carrying response
    Protocol(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Protocol(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Transport(msg) => write!(f, "Transport failure: {}", msg),
            ApiError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug)]
pub enum TraversalError {
    /// Fetching page `page` (0-based) failed; pages before it were delivered
    FetchFailed { page: usize, source: ApiError },
}

impl fmt::Display for TraversalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalError::FetchFailed { page, source } => {
                write!(f, "Fetch failed on page {}: {}", page, source)
            }
        }
    }
}

impl std::error::Error for TraversalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraversalError::FetchFailed { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingField(&'static str),
    InvalidTimestamp(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingField(field) => write!(f, "Required field '{}' is missing", field),
            ValidationError::InvalidTimestamp(raw) => write!(f, "Invalid timestamp: {}", raw),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum PersistenceError {
    Database(String),
    Serialization(serde_json::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err)
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Database(e) => write!(f, "Database error: {}", e),
            PersistenceError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PersistenceError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for PersistenceError {}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
