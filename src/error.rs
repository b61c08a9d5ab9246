//! Error types for the event aggregator

use thiserror::Error;

/// Result type for durable store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the durable store
///
/// A uniqueness conflict on the dedup key is not an error: it is reported as
/// [`crate::store::InsertOutcome::Duplicate`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Payload could not be encoded or decoded
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Store could not be reached or was closed
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persist attempt exceeded the configured timeout and was rolled back
    #[error("Persist attempt timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl StoreError {
    /// Check if the error is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| is_busy_code(&code))
            }
            StoreError::Database(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            StoreError::Unavailable(_) | StoreError::Timeout(_) => true,
            StoreError::Payload(_) => false,
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// SQLite reports extended result codes; the primary code is the low byte
fn is_busy_code(code: &str) -> bool {
    code.parse::<i32>()
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

/// Result type for pipeline and configuration operations
pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// Errors raised by the pipeline, configuration and server wiring
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Bounded queue is at capacity; the event was not accepted
    #[error("Queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The worker has stopped and the queue no longer accepts events
    #[error("Queue closed")]
    QueueClosed,

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid configuration value
    #[error("Invalid config {key}: {message}")]
    Config { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AggregatorError {
    pub(crate) fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        AggregatorError::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}
