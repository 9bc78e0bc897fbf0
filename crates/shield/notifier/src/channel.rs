//! Delivery channels and guardian contact records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shield_types::{DeliveryMethod, Guardian, GuardianId};
use tracing::info;

use crate::error::NotifyResult;
use crate::template::MessageContent;

/// Contact details for one guardian, held only for the duration of a send.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianContact {
    pub guardian_id: GuardianId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub push_token: Option<String>,
}

// Contact details stay out of Debug output so they never reach logs.
impl std::fmt::Debug for GuardianContact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianContact")
            .field("guardian_id", &self.guardian_id)
            .field("has_phone", &self.phone.is_some())
            .field("has_push_token", &self.push_token.is_some())
            .finish()
    }
}

impl GuardianContact {
    /// Address for `method`, if the guardian has one.
    pub fn target(&self, method: DeliveryMethod) -> Option<&str> {
        let target = match method {
            DeliveryMethod::Email => Some(self.email.as_str()),
            DeliveryMethod::Sms => self.phone.as_deref(),
            DeliveryMethod::Push => self.push_token.as_deref(),
        };
        target.filter(|t| !t.trim().is_empty())
    }
}

impl From<&Guardian> for GuardianContact {
    fn from(guardian: &Guardian) -> Self {
        Self {
            guardian_id: guardian.id.clone(),
            name: guardian.name.clone(),
            email: guardian.email.clone(),
            phone: guardian.phone.clone(),
            push_token: guardian.push_token.clone(),
        }
    }
}

/// An external delivery service (email, SMS or push).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn method(&self) -> DeliveryMethod;

    /// Deliver `content` to `target`. Transport failures that may succeed on
    /// a later attempt should be reported with [`NotifyError::transient`].
    ///
    /// [`NotifyError::transient`]: crate::NotifyError::transient
    async fn send(&self, target: &str, content: &MessageContent) -> NotifyResult<()>;
}

/// Channel that records deliveries in the log instead of sending them.
///
/// Used by the daemon when no real transport is wired in.
pub struct LoggingChannel {
    method: DeliveryMethod,
}

impl LoggingChannel {
    pub fn new(method: DeliveryMethod) -> Self {
        Self { method }
    }
}

#[async_trait]
impl NotificationChannel for LoggingChannel {
    fn method(&self) -> DeliveryMethod {
        self.method
    }

    async fn send(&self, _target: &str, content: &MessageContent) -> NotifyResult<()> {
        info!(
            channel = %self.method,
            subject = %content.subject,
            body_len = content.body.len(),
            "notification delivered to log channel"
        );
        Ok(())
    }
}
