//! Emergency activation records and guardian responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notification::NotificationPriority;
use crate::{ActivationId, GuardianId, UserId};

/// What started an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    InactivityDetected,
    HealthCheckFailure,
    ManualGuardian,
    Medical,
    AdminOverride,
}

string_tags!(TriggerType, "trigger type", {
    InactivityDetected => "inactivity_detected",
    HealthCheckFailure => "health_check_failure",
    ManualGuardian => "manual_guardian",
    Medical => "medical",
    AdminOverride => "admin_override",
});

impl TriggerType {
    /// Human-readable reason shown to guardians.
    pub fn reason_text(&self) -> &'static str {
        match self {
            TriggerType::InactivityDetected => "Extended period of inactivity detected",
            TriggerType::HealthCheckFailure => "Multiple missed health check responses",
            TriggerType::ManualGuardian => "Manual activation requested by guardian",
            TriggerType::Medical => "Medical emergency reported",
            TriggerType::AdminOverride => "Administrative emergency activation",
        }
    }

    pub fn priority(&self) -> NotificationPriority {
        match self {
            TriggerType::InactivityDetected => NotificationPriority::High,
            TriggerType::HealthCheckFailure => NotificationPriority::Medium,
            TriggerType::ManualGuardian | TriggerType::Medical | TriggerType::AdminOverride => {
                NotificationPriority::Urgent
            }
        }
    }
}

/// Lifecycle of an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

string_tags!(ActivationStatus, "activation status", {
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
    Expired => "expired",
});

impl ActivationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActivationStatus::Pending)
    }
}

/// A row of `family_shield_activation_log`.
///
/// Escalation bookkeeping lives on the record so a restarted process picks
/// up outstanding deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyActivation {
    pub id: ActivationId,
    pub user_id: UserId,
    /// Guardian notified first.
    pub guardian_id: GuardianId,
    pub trigger_type: TriggerType,
    pub verification_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub status: ActivationStatus,
    pub guardian_email: String,
    pub guardian_name: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub escalation_round: u32,
    pub next_escalation_at: Option<DateTime<Utc>>,
    /// Every guardian notified so far, in notification order.
    pub notified_guardians: Vec<GuardianId>,
}

impl EmergencyActivation {
    pub fn is_pending(&self) -> bool {
        self.status == ActivationStatus::Pending
    }

    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.token_expires_at
    }

    pub fn escalation_due(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.next_escalation_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// A guardian's answer to an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianDecision {
    Confirmed,
    Denied,
}

string_tags!(GuardianDecision, "guardian decision", {
    Confirmed => "confirmed",
    Denied => "denied",
});

/// One recorded guardian response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianResponse {
    pub activation_id: ActivationId,
    pub guardian_id: GuardianId,
    pub decision: GuardianDecision,
    pub notes: Option<String>,
    pub responded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn activation(now: DateTime<Utc>) -> EmergencyActivation {
        EmergencyActivation {
            id: ActivationId::generate(),
            user_id: UserId::new("u"),
            guardian_id: GuardianId::new("g"),
            trigger_type: TriggerType::InactivityDetected,
            verification_token: "t".to_string(),
            token_expires_at: now + Duration::days(7),
            status: ActivationStatus::Pending,
            guardian_email: "g@example.com".to_string(),
            guardian_name: "G".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
            escalation_round: 0,
            next_escalation_at: Some(now + Duration::hours(24)),
            notified_guardians: vec![GuardianId::new("g")],
        }
    }

    #[test]
    fn escalation_due_only_after_deadline() {
        let now = Utc::now();
        let a = activation(now);
        assert!(!a.escalation_due(now));
        assert!(a.escalation_due(now + Duration::hours(24)));
    }

    #[test]
    fn terminal_activation_never_escalates() {
        let now = Utc::now();
        let mut a = activation(now);
        a.status = ActivationStatus::Expired;
        assert!(!a.escalation_due(now + Duration::days(2)));
        assert!(a.status.is_terminal());
    }

    #[test]
    fn urgent_triggers_map_to_urgent_priority() {
        assert_eq!(TriggerType::Medical.priority(), NotificationPriority::Urgent);
        assert_eq!(
            TriggerType::HealthCheckFailure.priority(),
            NotificationPriority::Medium
        );
    }
}
