//! Store error taxonomy

use metronome_core::error::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store and the job service.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed job definition; user-visible 400.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Job id missing; 404 upstream.
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// Unique constraint violation; 409 upstream.
    #[error("job {0} already exists")]
    Conflict(Uuid),

    /// A stored row that no longer parses into the domain model.
    #[error("failed to decode stored job: {0}")]
    Decode(String),

    /// The job's own failure, relayed by finalize when the lease release
    /// could not be persisted. Otherwise it only lives in the execution
    /// record's error message.
    #[error("{0}")]
    ExecutionFailure(String),

    /// Transient database failure; 500 upstream, logged and skipped in the
    /// runner until the next tick.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
