//! Error types for issue-archive
//!
//! Every failure the archiver can surface is a variant of [`Error`]. A rate-limited
//! response is deliberately absent: the fetcher waits it out and never reports it.
//! All other variants abort the current run; because records are committed one at a
//! time, an aborted run leaves the store valid and the next run resumes from it.

use thiserror::Error;

/// Result type alias for issue-archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for issue-archive
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api.base_url")
        key: Option<String>,
    },

    /// Record store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Transport-level failure (connection refused, timeout, truncated body)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status that is not a rate-limit signal
    #[error("HTTP {status} {reason} for {url}")]
    Http {
        /// The requested URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase for the status
        reason: String,
    },

    /// A followed link pointed outside the origin it was expected to stay on
    #[error("origin mismatch: expected {expected}, got {actual}")]
    OriginMismatch {
        /// Origin of the request the link was derived from
        expected: String,
        /// The offending URL
        actual: String,
    },

    /// A URL could not be parsed or built
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container error
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// An archive entry path would escape or corrupt the container layout
    #[error("unsafe archive path {path:?}: {reason}")]
    UnsafePath {
        /// The offending path, joined with `/`
        path: String,
        /// Why the path was rejected
        reason: String,
    },

    /// Two records resolved to the same archive entry path
    #[error("duplicate archive path: {0}")]
    DuplicatePath(String),
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

    /// Constraint violation (duplicate id or url, dangling reaction parent)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUrl(e.to_string())
    }
}

impl Error {
    /// Build an [`Error::Http`] from a status code
    pub fn http(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        Error::Http {
            url: url.into(),
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        }
    }

    /// Returns true if this is a store constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::ConstraintViolation(_)))
    }
}
