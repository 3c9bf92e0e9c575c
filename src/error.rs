//! Error types for bangumi-dispatch
//!
//! This module provides the error taxonomy for the library:
//! - [`Error`] - top-level error returned by pipeline and database operations
//! - [`DispatchError`] - per-item failures reported by a [`DownloadClient`](crate::client::DownloadClient)
//! - [`DatabaseError`] - SQLite persistence failures with context
//!
//! Per-item dispatch failures never escape a drain cycle; they are logged, handed to the
//! retry worker and, once exhausted, recorded as dead letters. [`Error`] is what callers of
//! the pipeline itself see.

use thiserror::Error;

/// Result type alias for bangumi-dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bangumi-dispatch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Submitting a torrent to the download client failed
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Bulk persistence of submitted torrents failed
    #[error("failed to persist {count} torrent(s): {message}")]
    Persistence {
        /// Number of torrent records that could not be written
        count: usize,
        /// Underlying failure description
        message: String,
    },

    /// Queue is at capacity and the overflow policy rejects new work
    #[error("queue full: capacity {capacity} reached")]
    QueueFull {
        /// Configured queue capacity
        capacity: usize,
    },

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new torrents")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable error code, stable across releases
    ///
    /// Used for structured log fields and for the `error_kind` column of dead-letter records.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Dispatch(e) => e.error_code(),
            Error::Persistence { .. } => "persistence_error",
            Error::QueueFull { .. } => "queue_full",
            Error::ShuttingDown => "shutting_down",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Failure reported by the download client for a single torrent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The download client rejected our credentials
    #[error("download client rejected credentials: {0}")]
    Unauthorized(String),

    /// Any failure that may succeed if attempted again (timeouts, connection resets, 5xx)
    #[error("transient download client failure: {0}")]
    Transient(String),

    /// The client refused this particular torrent (bad URL, unsupported link)
    #[error("download client rejected torrent: {0}")]
    Rejected(String),
}

impl DispatchError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            DispatchError::Unauthorized(_) => "unauthorized",
            DispatchError::Transient(_) => "transient",
            DispatchError::Rejected(_) => "rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_codes() {
        assert_eq!(
            DispatchError::Unauthorized("bad password".into()).error_code(),
            "unauthorized"
        );
        assert_eq!(
            DispatchError::Transient("timeout".into()).error_code(),
            "transient"
        );
        assert_eq!(
            DispatchError::Rejected("not a magnet".into()).error_code(),
            "rejected"
        );
    }

    #[test]
    fn test_top_level_error_codes_delegate_to_dispatch() {
        let err = Error::from(DispatchError::Unauthorized("nope".into()));
        assert_eq!(err.error_code(), "unauthorized");
        assert_eq!(Error::ShuttingDown.error_code(), "shutting_down");
        assert_eq!(Error::QueueFull { capacity: 3 }.error_code(), "queue_full");
        assert_eq!(
            Error::Database(DatabaseError::QueryFailed("locked".into())).error_code(),
            "database_error"
        );
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = Error::Persistence {
            count: 4,
            message: "database is locked".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to persist 4 torrent(s): database is locked"
        );

        let err = Error::Config {
            message: "batch_size must be at least 1".into(),
            key: Some("batch_size".into()),
        };
        assert!(err.to_string().contains("batch_size must be at least 1"));
    }
}
