//! Notifier configuration.

use serde::{Deserialize, Serialize};
use shield_types::DeliveryMethod;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Outbound calls allowed in flight at once on each channel.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_per_channel: usize,

    #[serde(default)]
    pub email_retry: RetryPolicy,

    #[serde(default)]
    pub sms_retry: RetryPolicy,

    #[serde(default = "default_push_retry")]
    pub push_retry: RetryPolicy,
}

fn default_max_in_flight() -> usize {
    10
}

fn default_push_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_in_flight_per_channel: default_max_in_flight(),
            email_retry: RetryPolicy::default(),
            sms_retry: RetryPolicy::default(),
            push_retry: default_push_retry(),
        }
    }
}

impl NotifierConfig {
    pub fn retry_for(&self, method: DeliveryMethod) -> &RetryPolicy {
        match method {
            DeliveryMethod::Email => &self.email_retry,
            DeliveryMethod::Sms => &self.sms_retry,
            DeliveryMethod::Push => &self.push_retry,
        }
    }
}
