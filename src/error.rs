// src/error.rs

//! Unified error handling for the collector.

use std::fmt;

use thiserror::Error;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Whether a failed request is worth retrying later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, connection resets, 429 and 5xx responses
    Transient,
    /// Other 4xx responses and malformed bodies
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => f.write_str("transient"),
            FailureKind::Permanent => f.write_str("permanent"),
        }
    }
}

/// A request that could not produce a page.
///
/// Returned as a value by the retrying client; the caller decides whether
/// the resource is aborted or continues with what it already has.
#[derive(Error, Debug, Clone)]
#[error("{kind} failure for {url} after {attempts} attempt(s): {message}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub url: String,
    /// HTTP status of the last response, if one was received
    pub status: Option<u16>,
    pub attempts: u32,
    pub message: String,
}

impl FetchFailure {
    pub fn transient(url: impl Into<String>, attempts: u32, message: impl fmt::Display) -> Self {
        Self {
            kind: FailureKind::Transient,
            url: url.into(),
            status: None,
            attempts,
            message: message.to_string(),
        }
    }

    pub fn permanent(url: impl Into<String>, attempts: u32, message: impl fmt::Display) -> Self {
        Self {
            kind: FailureKind::Permanent,
            url: url.into(),
            status: None,
            attempts,
            message: message.to_string(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request could not be sent
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Ledger database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Upstream request failed
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchFailure),

    /// Persistent store rejected a read or write
    #[error("Storage error in {context}: {message}")]
    Storage { context: String, message: String },

    /// Alert channel refused a message
    #[error("{channel} delivery failed: {message}")]
    Delivery { channel: String, message: String },

    /// Requested snapshot or record does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a storage error with context.
    pub fn storage(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a delivery error for an alert channel.
    pub fn delivery(channel: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Delivery {
            channel: channel.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
