//! Error types for ConceptDB operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all ConceptDB crates. Collaborator adapters (precise store,
//! semantic store, concept extraction, embeddings) report failures with this
//! type; the router, sync manager, and phase manager catch them at their
//! boundaries and turn them into structured outcomes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in ConceptDB operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific path.
    #[error("I/O error at {path}: {source}")]
    IoWithPath {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A store adapter call failed.
    #[error("{backend} unavailable: {message}")]
    BackendUnavailable {
        /// Which collaborator failed ("precise", "semantic", "extraction", ...).
        backend: String,
        /// Failure detail.
        message: String,
    },

    /// A store adapter call exceeded its timeout.
    #[error("{backend} timed out after {}ms", after.as_millis())]
    Timeout {
        /// Which collaborator timed out.
        backend: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The statement or operation is not supported by this adapter.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a backend-unavailable error.
    pub fn backend(backend: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(backend: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            backend: backend.into(),
            after,
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a generic operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Wrap an I/O error with the path that produced it.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether retrying the failed call could succeed.
    ///
    /// Backend outages and timeouts are transient; everything else is a
    /// property of the request or the configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. } | Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using ConceptDB's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = Error::backend("semantic", "connection refused");
        assert_eq!(err.to_string(), "semantic unavailable: connection refused");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::timeout("precise", Duration::from_millis(250));
        assert_eq!(err.to_string(), "precise timed out after 250ms");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::backend("semantic", "down").is_retryable());
        assert!(Error::timeout("precise", Duration::from_secs(1)).is_retryable());
        assert!(!Error::config("bad").is_retryable());
        assert!(!Error::invalid_data("bad").is_retryable());
        assert!(!Error::unsupported("DROP TABLE").is_retryable());
    }

    #[test]
    fn test_io_with_path_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = Error::io_with_path(io, "/tmp/phase.json");
        assert!(err.to_string().contains("/tmp/phase.json"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
