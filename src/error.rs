//! Error types for the session and transaction layer.
//!
//! Lifecycle misuse (connecting twice, committing an unopened session, ...)
//! gets its own variant so callers can match on it. Driver failures are
//! carried through untouched in [`DbError::Driver`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database URL: {url} (expected <scheme>://<rest>)")]
    InvalidUrl { url: String },

    #[error("Unknown database scheme: {scheme}")]
    UnknownScheme { scheme: String },

    #[error("Database is not connected")]
    NotConnected,

    #[error("Database is already connected")]
    AlreadyConnected,

    #[error("Database was disconnected and cannot be reopened; create a new instance")]
    ReopenProhibited,

    #[error("Session is already open")]
    SessionAlreadyOpen,

    #[error("Session is not open")]
    SessionNotOpen,

    #[error("Savepoint nesting limit reached (max depth: {max_depth})")]
    SavepointDepthExceeded { max_depth: usize },

    /// Commit or cancel targeted a savepoint that is not the innermost one.
    #[error("Savepoint {savepoint} is not the innermost open savepoint")]
    SavepointOrder { savepoint: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

impl DbError {
    /// Create an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Create an unknown scheme error.
    pub fn unknown_scheme(scheme: impl Into<String>) -> Self {
        Self::UnknownScheme {
            scheme: scheme.into(),
        }
    }

    /// Create a savepoint depth error.
    pub fn savepoint_depth_exceeded(max_depth: usize) -> Self {
        Self::SavepointDepthExceeded { max_depth }
    }

    /// Create a savepoint ordering error.
    pub fn savepoint_order(savepoint: impl Into<String>) -> Self {
        Self::SavepointOrder {
            savepoint: savepoint.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for errors raised by the connect/session state machines rather
    /// than by the database itself.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::AlreadyConnected
                | Self::ReopenProhibited
                | Self::SessionAlreadyOpen
                | Self::SessionNotOpen
                | Self::SavepointDepthExceeded { .. }
                | Self::SavepointOrder { .. }
        )
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
