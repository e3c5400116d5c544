//! Core error types for daybook-core.
//!
//! The engine surfaces a small, closed taxonomy to its callers. PostGate and
//! FeedPager return these as typed results; the usage meter and impression
//! tracker only ever log them.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for daybook-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No viewer identity is available.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A second insert for the same (viewer, local date) lost the race.
    #[error("An entry for {local_date} already exists")]
    AlreadyPosted { local_date: String },

    /// A non-visibility field was changed after the edit window closed.
    #[error("Edit window expired; only visibility can be changed")]
    WindowExpired,

    /// Generic concurrent-write signal.
    #[error("Conflicting write: {0}")]
    Conflict(String),

    /// Network or storage failure assumed retryable.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The target row does not exist or is not owned by the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching storage.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether a manual retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Transient(_) | CoreError::Storage(StorageError::Locked)
        )
    }

    /// Whether the error reports a uniqueness violation.
    pub fn is_uniqueness_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::AlreadyPosted { .. }
                | CoreError::Conflict(_)
                | CoreError::Storage(StorageError::UniqueViolation(_))
        )
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A UNIQUE or PRIMARY KEY constraint rejected the write
    #[error("Uniqueness constraint violated: {0}")]
    UniqueViolation(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Too many items in a bounded list
    #[error("Too many {collection}: {len} (max {max})")]
    TooMany {
        collection: &'static str,
        len: usize,
        max: usize,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    StorageError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    StorageError::UniqueViolation(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                _ => StorageError::QueryFailed(err.to_string()),
            },
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Storage(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
