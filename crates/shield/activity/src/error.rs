use shield_storage::StorageError;
use thiserror::Error;

/// Result type for activity tracking.
pub type ActivityResult<T> = Result<T, ActivityError>;

/// Activity tracking errors.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("activity source {source_name} failed: {message}")]
    Source {
        source_name: &'static str,
        message: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
