//! Store error types.

use std::time::Duration;
use thiserror::Error;

use super::timeouts::TimeoutError;
use crate::bracket::models::MatchId;

/// Errors raised by a bracket store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query or transaction timed out
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Row changed since it was read (optimistic concurrency)
    #[error("Match {match_id} was modified concurrently (expected version {expected})")]
    VersionConflict { match_id: MatchId, expected: i64 },

    /// Insert lost a race against a concurrent writer on a unique index
    #[error("Concurrent insert rejected by {constraint}")]
    DuplicateRow { constraint: String },

    /// Stored value could not be mapped onto the model
    #[error("Corrupt row: {0}")]
    Decode(String),
}

impl From<TimeoutError> for StoreError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(duration) => StoreError::Timeout(duration),
            TimeoutError::Database(e) => StoreError::Database(e),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
