use serde::{Deserialize, Serialize};
use shield_access::AccessError;
use shield_notifier::NotifyError;
use shield_storage::StorageError;
use shield_trigger::TriggerError;
use shield_types::{GuardianId, UserId};
use thiserror::Error;

/// Result type for emergency service operations.
pub type EmergencyResult<T> = Result<T, EmergencyError>;

/// Why a guardian's verification token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    /// No activation carries this token.
    Unknown,
    Expired,
    /// The activation has already been approved, denied or expired.
    NotPending,
    /// This guardian has already answered with this token.
    AlreadyUsed,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRejection::Unknown => "unknown",
            TokenRejection::Expired => "expired",
            TokenRejection::NotPending => "not_pending",
            TokenRejection::AlreadyUsed => "already_used",
        }
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emergency service errors.
#[derive(Debug, Error)]
pub enum EmergencyError {
    #[error("no active guardian of {0} may confirm an emergency")]
    NoEligibleGuardians(UserId),

    #[error("verification token rejected: {reason}")]
    TokenInvalidOrExpired { reason: TokenRejection },

    #[error("{0} already has a pending emergency activation")]
    ActivationAlreadyPending(UserId),

    #[error("evaluation for {0} does not call for an activation")]
    NotTriggered(UserId),

    #[error("shield settings not found for {0}")]
    SettingsNotFound(UserId),

    #[error("{0} is not an eligible guardian for this user")]
    GuardianNotEligible(GuardianId),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EmergencyError {
    pub(crate) fn token(reason: TokenRejection) -> Self {
        EmergencyError::TokenInvalidOrExpired { reason }
    }

    /// The store could not be reached; the operation may be retried.
    pub fn is_unavailable(&self) -> bool {
        match self {
            EmergencyError::Storage(err) => err.is_unavailable(),
            EmergencyError::Trigger(TriggerError::Storage(err)) => err.is_unavailable(),
            EmergencyError::Access(AccessError::Storage(err)) => err.is_unavailable(),
            _ => false,
        }
    }
}
