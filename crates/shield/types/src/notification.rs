//! Guardian notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActivationId, GuardianId, NotificationId, UserId};

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Email,
    Sms,
    Push,
}

string_tags!(DeliveryMethod, "delivery method", {
    Email => "email",
    Sms => "sms",
    Push => "push",
});

/// Why a guardian is being contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ActivationRequest,
    VerificationNeeded,
    ShieldActivated,
}

string_tags!(NotificationKind, "notification kind", {
    ActivationRequest => "activation_request",
    VerificationNeeded => "verification_needed",
    ShieldActivated => "shield_activated",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

string_tags!(NotificationPriority, "notification priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

string_tags!(DeliveryStatus, "delivery status", {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
});

/// A row of `guardian_notifications`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianNotification {
    pub id: NotificationId,
    pub guardian_id: GuardianId,
    pub user_id: UserId,
    pub activation_id: Option<ActivationId>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    /// Primary channel; email for every urgency.
    pub delivery_method: DeliveryMethod,
    /// Channels that actually accepted the message.
    pub delivered_via: Vec<DeliveryMethod>,
    pub delivery_status: DeliveryStatus,
    pub delivery_error: Option<String>,
    pub action_required: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}
