//! Message data, notification records and verification tokens.

use chrono::{DateTime, Utc};
use shield_notifier::{NotificationOutcome, TemplateData};
use shield_types::{
    DeliveryMethod, DeliveryStatus, EmergencyActivation, Guardian, GuardianNotification,
    NotificationId, NotificationKind, NotificationPriority, Urgency,
};

/// Steps listed in every activation request.
pub const EMERGENCY_INSTRUCTIONS: [&str; 4] = [
    "Review the emergency activation request carefully",
    "Coordinate with other guardians if necessary",
    "Follow established emergency protocols",
    "Document all actions taken",
];

/// Token length in bytes before hex encoding.
pub const TOKEN_BYTES: usize = 32;

pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

pub fn urgency_for(priority: NotificationPriority) -> Urgency {
    match priority {
        NotificationPriority::Urgent => Urgency::Critical,
        NotificationPriority::High => Urgency::High,
        NotificationPriority::Medium => Urgency::Medium,
        NotificationPriority::Low => Urgency::Low,
    }
}

pub fn template_data(activation: &EmergencyActivation, base_url: &str) -> TemplateData {
    let instructions = EMERGENCY_INSTRUCTIONS
        .iter()
        .map(|step| format!("- {step}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut data = TemplateData::new();
    data.insert("userName".to_string(), activation.user_id.as_str().to_string());
    data.insert(
        "reason".to_string(),
        activation.trigger_type.reason_text().to_string(),
    );
    data.insert(
        "verificationUrl".to_string(),
        format!("{base_url}?token={}", activation.verification_token),
    );
    data.insert(
        "expiresAt".to_string(),
        activation.token_expires_at.to_rfc3339(),
    );
    data.insert("instructions".to_string(), instructions);
    data
}

/// One record per guardian for a notify round. Guardians missing from
/// `outcome` (the batch never ran) are recorded as failed.
pub fn notification_records(
    activation: &EmergencyActivation,
    guardians: &[Guardian],
    kind: NotificationKind,
    title: &str,
    outcome: Option<&NotificationOutcome>,
    now: DateTime<Utc>,
) -> Vec<GuardianNotification> {
    guardians
        .iter()
        .map(|guardian| {
            let delivery = outcome.and_then(|o| o.delivery_for(&guardian.id));
            let delivered_via = delivery.map(|d| d.succeeded.clone()).unwrap_or_default();
            let reached = !delivered_via.is_empty();

            let delivery_error = if reached {
                None
            } else {
                let errors = outcome
                    .map(|o| {
                        o.failures
                            .iter()
                            .filter(|f| f.guardian_id == guardian.id)
                            .map(|f| format!("{}: {}", f.method, f.error))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                Some(if errors.is_empty() {
                    "notification was not delivered".to_string()
                } else {
                    errors.join("; ")
                })
            };

            GuardianNotification {
                id: NotificationId::generate(),
                guardian_id: guardian.id.clone(),
                user_id: activation.user_id.clone(),
                activation_id: Some(activation.id),
                kind,
                title: title.to_string(),
                message: activation.trigger_type.reason_text().to_string(),
                priority: activation.trigger_type.priority(),
                delivery_method: DeliveryMethod::Email,
                delivered_via,
                delivery_status: if reached {
                    DeliveryStatus::Sent
                } else {
                    DeliveryStatus::Failed
                },
                delivery_error,
                action_required: true,
                expires_at: Some(activation.token_expires_at),
                created_at: now,
                sent_at: reached.then_some(now),
                read_at: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_hex_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn urgent_priority_uses_every_channel() {
        assert_eq!(urgency_for(NotificationPriority::Urgent), Urgency::Critical);
        assert_eq!(urgency_for(NotificationPriority::Medium), Urgency::Medium);
    }
}
