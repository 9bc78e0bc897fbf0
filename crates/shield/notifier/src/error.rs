use shield_types::DeliveryMethod;
use thiserror::Error;

/// Result type for notification operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Notification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Rendering left `{{placeholder}}` text in the output.
    #[error("template {template} has unresolved placeholders: {}", .placeholders.join(", "))]
    UnresolvedPlaceholders {
        template: String,
        placeholders: Vec<String>,
    },

    #[error("template {template} is malformed: {message}")]
    MalformedTemplate { template: String, message: String },

    #[error("no {0} channel configured")]
    ChannelNotConfigured(DeliveryMethod),

    /// A single delivery attempt failed. `retryable` failures are retried
    /// according to the channel's retry policy.
    #[error("{method} delivery failed: {message}")]
    Delivery {
        method: DeliveryMethod,
        message: String,
        retryable: bool,
    },
}

impl NotifyError {
    pub fn transient(method: DeliveryMethod, message: impl Into<String>) -> Self {
        NotifyError::Delivery {
            method,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(method: DeliveryMethod, message: impl Into<String>) -> Self {
        NotifyError::Delivery {
            method,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, NotifyError::Delivery { retryable: true, .. })
    }
}
