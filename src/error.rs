//! Application error types.
//!
//! These errors are serializable so the query API and the status endpoint can
//! surface them to the browser extension as plain messages.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Upstream (review or CI) API request failed.
    #[error("Upstream API error: {message}")]
    Upstream {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream rejected our credentials.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Reading or writing a snapshot file failed.
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },

    /// Configuration value missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },

    /// Every listing call of a fetch cycle failed.
    #[error("Source {source_name} unavailable: {message}")]
    SourceUnavailable { message: String, source_name: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create an upstream API error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create an upstream API error with status code and endpoint.
    pub fn upstream_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            path: None,
        }
    }

    /// Create a persistence error for a specific file.
    pub fn persistence_at(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a configuration error for a specific key.
    pub fn config_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Create a source-unavailable error.
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
            source_name: source_name.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// Conversions from common error types

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::upstream(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(err.to_string())
    }
}
