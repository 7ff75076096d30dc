//! Error types for accessreport.
//!
//! Library crates use [`AccessReportError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all accessreport operations.
#[derive(Debug, thiserror::Error)]
pub enum AccessReportError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The API rejected the credentials (HTTP 401/403).
    #[error("authentication failed for {url}: HTTP {status}")]
    Authentication { url: String, status: u16 },

    /// The requested resource does not exist (HTTP 404).
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any other client-side HTTP failure (4xx).
    #[error("request to {url} failed: HTTP {status}")]
    Http { url: String, status: u16 },

    /// Server-side failure (5xx) that persisted through retries.
    #[error("server error from {url}: HTTP {status}")]
    Server { url: String, status: u16 },

    /// Transport failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape.
    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    /// Data validation error (bad project key, unknown group, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Tabular output encoding error.
    #[error("csv error: {0}")]
    Csv(String),

    /// A worker task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AccessReportError>;

impl AccessReportError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a malformed-response error for the given URL.
    pub fn malformed(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map a non-success HTTP status onto the error taxonomy.
    pub fn from_status(url: impl Into<String>, status: u16) -> Self {
        let url = url.into();
        match status {
            401 | 403 => Self::Authentication { url, status },
            404 => Self::NotFound { url },
            500..=599 => Self::Server { url, status },
            _ => Self::Http { url, status },
        }
    }

    /// True for an HTTP 401 response.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Authentication { status: 401, .. })
    }
}
