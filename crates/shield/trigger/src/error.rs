use shield_activity::ActivityError;
use shield_storage::StorageError;
use thiserror::Error;

/// Result type for trigger evaluation.
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Trigger evaluation errors.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error(transparent)]
    Activity(#[from] ActivityError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
