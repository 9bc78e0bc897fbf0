//! Guardian Shield notifier.
//!
//! Delivers activation notices and reminders to guardians over email, SMS
//! and push. Urgency picks the channels, each channel has its own
//! concurrency limit and retry policy, and per-channel failures are
//! collected into a [`NotificationOutcome`] instead of failing the batch.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod channel;
pub mod config;
mod error;
pub mod notifier;
pub mod retry;
pub mod template;

pub use channel::{GuardianContact, LoggingChannel, NotificationChannel};
pub use config::NotifierConfig;
pub use error::{NotifyError, NotifyResult};
pub use notifier::{
    channels_for, DeliveryFailure, GuardianDelivery, GuardianNotifier, NotificationOutcome,
    NotificationRequest, GUARDIAN_NAME_KEY,
};
pub use retry::RetryPolicy;
pub use template::{MessageContent, ReminderKind, Template, TemplateData};
