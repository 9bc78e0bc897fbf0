use shield_storage::StorageError;
use shield_types::{AccessRequestId, AccessStatus};
use thiserror::Error;

/// Result type for access-control operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Access-control errors.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A required field was missing or empty. Never defaulted.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("access request not found: {0}")]
    NotFound(AccessRequestId),

    #[error("access request cannot move from {from} to {to}")]
    InvalidTransition { from: AccessStatus, to: AccessStatus },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
