//! Error types for the LocalLift offline engine.
//!
//! Strategies never surface these to the page: every intercepted fetch
//! resolves with a response. Errors reach callers only from lifecycle,
//! storage and configuration operations.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the engine.
#[derive(Debug, Error)]
pub enum LiftError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Storage errors
    #[error("Cache storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Lifecycle errors
    #[error("Install failed: {failed} of {total} manifest entries could not be cached")]
    InstallFailed { failed: usize, total: usize },

    #[error("Worker is redundant and cannot be activated")]
    Redundant,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, LiftError>;

impl From<std::io::Error> for LiftError {
    fn from(err: std::io::Error) -> Self {
        LiftError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LiftError {
    fn from(err: serde_json::Error) -> Self {
        LiftError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for LiftError {
    fn from(err: rusqlite::Error) -> Self {
        LiftError::Storage {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for LiftError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LiftError::Timeout(std::time::Duration::from_secs(0))
        } else {
            LiftError::Network {
                message: err.to_string(),
                source: Some(err),
            }
        }
    }
}

impl From<url::ParseError> for LiftError {
    fn from(err: url::ParseError) -> Self {
        LiftError::InvalidUrl {
            url: String::new(),
            message: err.to_string(),
        }
    }
}

impl LiftError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        LiftError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a network error without an underlying transport error.
    pub fn offline(message: impl Into<String>) -> Self {
        LiftError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error for a poisoned or unavailable lock.
    pub(crate) fn lock(err: impl std::fmt::Display) -> Self {
        LiftError::Storage {
            message: format!("Failed to lock cache storage: {}", err),
            source: None,
        }
    }

    /// Whether this error means the network could not be reached, as
    /// opposed to a local storage or configuration failure.
    pub fn is_network(&self) -> bool {
        matches!(self, LiftError::Network { .. } | LiftError::Timeout(_))
    }
}
