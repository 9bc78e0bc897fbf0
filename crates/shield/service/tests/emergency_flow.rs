//! End-to-end emergency flows against the in-memory store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use shield_access::{AccessContext, CreateAccessRequest};
use shield_activity::{ActivityTracker, SignalKind, StaticActivitySource};
use shield_notifier::{
    GuardianNotifier, MessageContent, NotificationChannel, NotifierConfig, NotifyError,
    NotifyResult, RetryPolicy,
};
use shield_service::{
    EmergencyConfig, EmergencyError, EmergencyService, EscalationMode, TokenRejection,
};
use shield_storage::memory::InMemoryShieldStorage;
use shield_storage::{ActivationStore, GuardianStore, NotificationStore, ShieldSettingsStore};
use shield_types::{
    AccessAction, AccessScope, AccessStatus, AccessorType, ActivationStatus, Clock,
    DeliveryMethod, DeliveryStatus, Guardian, GuardianDecision, GuardianId, GuardianPermissions,
    ManualClock, ShieldStatus, TriggerType, Urgency, UserId,
};

struct RecordingChannel {
    method: DeliveryMethod,
    sent: Mutex<Vec<(String, MessageContent)>>,
    failing: AtomicBool,
    /// Store taken offline as soon as this channel sends.
    takes_offline: Mutex<Option<Arc<InMemoryShieldStorage>>>,
}

impl RecordingChannel {
    fn new(method: DeliveryMethod) -> Arc<Self> {
        Arc::new(Self {
            method,
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            takes_offline: Mutex::new(None),
        })
    }

    fn sent(&self) -> Vec<(String, MessageContent)> {
        self.sent.lock().unwrap().clone()
    }

    fn targets(&self) -> Vec<String> {
        self.sent().into_iter().map(|(t, _)| t).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn method(&self) -> DeliveryMethod {
        self.method
    }

    async fn send(&self, target: &str, content: &MessageContent) -> NotifyResult<()> {
        if let Some(storage) = self.takes_offline.lock().unwrap().as_ref() {
            storage.set_offline(true);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::transient(self.method, "gateway unavailable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), content.clone()));
        Ok(())
    }
}

struct Harness {
    storage: Arc<InMemoryShieldStorage>,
    clock: Arc<ManualClock>,
    login: Arc<StaticActivitySource>,
    email: Arc<RecordingChannel>,
    sms: Arc<RecordingChannel>,
    service: EmergencyService,
}

fn user() -> UserId {
    UserId::new("u1")
}

fn harness(config: EmergencyConfig) -> Harness {
    let storage = Arc::new(InMemoryShieldStorage::new());
    let clock = Arc::new(ManualClock::default());
    let login = Arc::new(StaticActivitySource::new(SignalKind::Login));
    let email = RecordingChannel::new(DeliveryMethod::Email);
    let sms = RecordingChannel::new(DeliveryMethod::Sms);

    let tracker = Arc::new(
        ActivityTracker::new(storage.clone(), clock.clone()).with_source(login.clone()),
    );
    let notifier_config = NotifierConfig {
        email_retry: RetryPolicy::none(),
        sms_retry: RetryPolicy::none(),
        push_retry: RetryPolicy::none(),
        ..NotifierConfig::default()
    };
    let notifier = Arc::new(
        GuardianNotifier::new(notifier_config)
            .with_channel(email.clone())
            .with_channel(sms.clone()),
    );
    let service = EmergencyService::new(storage.clone(), clock.clone(), tracker, notifier, config);

    Harness {
        storage,
        clock,
        login,
        email,
        sms,
        service,
    }
}

fn guardian(id: &str, priority: u32, can_trigger: bool) -> Guardian {
    Guardian {
        id: GuardianId::new(id),
        user_id: user(),
        name: format!("Guardian {id}"),
        email: format!("{id}@example.com"),
        phone: Some(format!("+1555{priority:04}")),
        push_token: None,
        permissions: GuardianPermissions {
            can_trigger_emergency: can_trigger,
            emergency_contact_priority: priority,
            ..GuardianPermissions::default()
        },
        is_active: true,
    }
}

/// Enable the shield, register guardians and make the user 200 days quiet.
async fn arm(h: &Harness, quorum: u32, guardians: Vec<Guardian>) {
    let mut settings = h.service.initialize_for_user(&user()).await.unwrap();
    settings.is_enabled = true;
    settings.required_guardians_for_activation = quorum;
    h.storage.upsert_settings(settings).await.unwrap();

    for g in guardians {
        h.storage.upsert_guardian(g).await.unwrap();
    }
    h.login.record(user(), h.clock.now() - Duration::days(200));
}

async fn shield_status(h: &Harness) -> ShieldStatus {
    h.storage
        .get_settings(&user())
        .await
        .unwrap()
        .unwrap()
        .shield_status
}

#[tokio::test]
async fn trigger_quorum_and_guardian_access() {
    let h = harness(EmergencyConfig::default());
    arm(
        &h,
        2,
        vec![guardian("g1", 1, true), guardian("g2", 2, true), guardian("g3", 3, true)],
    )
    .await;

    let report = h.service.monitor_user(&user()).await.unwrap();
    assert!(report.should_alert);
    let activation = report.activation.expect("activation started");
    assert_eq!(activation.trigger_type, TriggerType::InactivityDetected);
    assert_eq!(
        activation.notified_guardians,
        vec![GuardianId::new("g1"), GuardianId::new("g2")]
    );
    assert_eq!(shield_status(&h).await, ShieldStatus::PendingVerification);

    assert_eq!(h.email.targets(), vec!["g1@example.com", "g2@example.com"]);
    assert_eq!(h.sms.sent().len(), 2);
    let (_, body) = &h.email.sent()[0];
    assert!(body.body.contains(&activation.verification_token));
    assert!(!body.body.contains("{{"));
    assert!(!body.subject.contains("{{"));

    let again = h.service.monitor_user(&user()).await.unwrap();
    assert!(again.activation.is_none());
    assert!(!again.evaluation.should_trigger);
    assert!(again.evaluation.reasons.iter().any(|r| r.starts_with("Suppressed")));

    let bad = h
        .service
        .record_guardian_response(
            "not-a-token",
            &GuardianId::new("g1"),
            GuardianDecision::Confirmed,
            None,
        )
        .await;
    assert!(matches!(
        bad,
        Err(EmergencyError::TokenInvalidOrExpired { reason: TokenRejection::Unknown })
    ));

    let token = activation.verification_token.clone();
    let first = h
        .service
        .record_guardian_response(&token, &GuardianId::new("g1"), GuardianDecision::Confirmed, None)
        .await
        .unwrap();
    assert_eq!(first.confirmations, 1);
    assert_eq!(first.shield_status, ShieldStatus::PendingVerification);
    assert_eq!(shield_status(&h).await, ShieldStatus::PendingVerification);

    let repeat = h
        .service
        .record_guardian_response(&token, &GuardianId::new("g1"), GuardianDecision::Confirmed, None)
        .await;
    assert!(matches!(
        repeat,
        Err(EmergencyError::TokenInvalidOrExpired { reason: TokenRejection::AlreadyUsed })
    ));

    let second = h
        .service
        .record_guardian_response(&token, &GuardianId::new("g2"), GuardianDecision::Confirmed, None)
        .await
        .unwrap();
    assert_eq!(second.confirmations, 2);
    assert_eq!(second.activation.status, ActivationStatus::Approved);
    assert_eq!(shield_status(&h).await, ShieldStatus::Active);

    let late = h
        .service
        .record_guardian_response(&token, &GuardianId::new("g3"), GuardianDecision::Confirmed, None)
        .await;
    assert!(matches!(
        late,
        Err(EmergencyError::TokenInvalidOrExpired { reason: TokenRejection::NotPending })
    ));

    let status = h.service.activation_status(&user()).await.unwrap().unwrap();
    assert_eq!(status.confirmations, 2);
    assert_eq!(status.required_confirmations, 2);

    let access = h.service.access();
    let request = access
        .create_access_request(CreateAccessRequest {
            user_id: user(),
            guardian_id: GuardianId::new("g2"),
            reason: "managing affairs".to_string(),
            urgency: Urgency::High,
            requested_access: [AccessScope::Documents].into_iter().collect(),
            duration_ms: Some(3_600_000),
        })
        .await
        .unwrap();
    access
        .update_request_status(&request.id, AccessStatus::Approved)
        .await
        .unwrap();

    let context = AccessContext {
        accessor_type: AccessorType::Guardian,
        accessor_id: "g2".to_string(),
        request_id: Some(request.id),
        permissions: GuardianPermissions::default(),
    };
    let decision = access
        .validate_access(&user(), AccessScope::Documents, "will.pdf", AccessAction::View, &context)
        .await
        .unwrap();
    assert!(decision.granted);
    assert_eq!(access.get_access_logs(Some(&request.id)).await.unwrap().len(), 1);

    h.service.reset_shield(&user()).await.unwrap();
    let after_reset = access
        .validate_access(&user(), AccessScope::Documents, "will.pdf", AccessAction::View, &context)
        .await
        .unwrap();
    assert!(!after_reset.granted);
}

#[tokio::test]
async fn escalation_walks_tiers_then_expires() {
    let h = harness(EmergencyConfig::default());
    arm(
        &h,
        1,
        vec![guardian("g1", 1, true), guardian("g2", 2, true), guardian("g3", 3, true)],
    )
    .await;

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    assert_eq!(activation.notified_guardians, vec![GuardianId::new("g1")]);

    let report = h.service.process_escalations(h.clock.now()).await.unwrap();
    assert_eq!(report.escalated, 0);

    h.clock.advance(Duration::hours(24));
    let report = h.service.process_escalations(h.clock.now()).await.unwrap();
    assert_eq!(report.escalated, 1);
    let current = h.storage.get_activation(&activation.id).await.unwrap().unwrap();
    assert_eq!(current.escalation_round, 1);
    assert_eq!(
        current.notified_guardians,
        vec![GuardianId::new("g1"), GuardianId::new("g2")]
    );
    let (_, reminder) = h.email.sent().last().cloned().unwrap();
    assert!(reminder.subject.starts_with("REMINDER"));

    h.clock.advance(Duration::hours(24));
    h.service.process_escalations(h.clock.now()).await.unwrap();
    h.clock.advance(Duration::hours(24));
    h.service.process_escalations(h.clock.now()).await.unwrap();
    let current = h.storage.get_activation(&activation.id).await.unwrap().unwrap();
    assert_eq!(current.escalation_round, 3);
    // 1 initial + g2 + g3 + all three reminded once everyone was contacted
    assert_eq!(h.email.sent().len(), 6);

    h.clock.advance(Duration::hours(24));
    let report = h.service.process_escalations(h.clock.now()).await.unwrap();
    assert_eq!(report.expired, 1);
    let current = h.storage.get_activation(&activation.id).await.unwrap().unwrap();
    assert_eq!(current.status, ActivationStatus::Expired);
    assert_eq!(shield_status(&h).await, ShieldStatus::Inactive);
}

#[tokio::test]
async fn same_set_escalation_reminds_only_contacted_guardians() {
    let config = EmergencyConfig {
        escalation_mode: EscalationMode::SameSet,
        ..EmergencyConfig::default()
    };
    let h = harness(config);
    arm(&h, 1, vec![guardian("g1", 1, true), guardian("g2", 2, true)]).await;

    h.service.monitor_user(&user()).await.unwrap();
    h.clock.advance(Duration::hours(24));
    h.service.process_escalations(h.clock.now()).await.unwrap();

    assert_eq!(h.email.targets(), vec!["g1@example.com", "g1@example.com"]);
}

#[tokio::test]
async fn expired_token_is_rejected_and_swept() {
    let config = EmergencyConfig {
        escalation_response_window_hours: 24 * 30,
        ..EmergencyConfig::default()
    };
    let h = harness(config);
    arm(&h, 1, vec![guardian("g1", 1, true)]).await;

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    h.clock.advance(Duration::days(8));

    let result = h
        .service
        .record_guardian_response(
            &activation.verification_token,
            &GuardianId::new("g1"),
            GuardianDecision::Confirmed,
            None,
        )
        .await;
    assert!(matches!(
        result,
        Err(EmergencyError::TokenInvalidOrExpired { reason: TokenRejection::Expired })
    ));
    assert_eq!(shield_status(&h).await, ShieldStatus::PendingVerification);

    let report = h.service.process_escalations(h.clock.now()).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(shield_status(&h).await, ShieldStatus::Inactive);
}

#[tokio::test]
async fn no_eligible_guardians_creates_nothing() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, false)]).await;

    let result = h.service.monitor_user(&user()).await;
    assert!(matches!(result, Err(EmergencyError::NoEligibleGuardians(_))));
    assert!(h
        .storage
        .latest_activation_for_user(&user())
        .await
        .unwrap()
        .is_none());
    assert!(h.email.sent().is_empty());
    assert_eq!(shield_status(&h).await, ShieldStatus::Inactive);
}

#[tokio::test]
async fn failed_delivery_leaves_activation_pending() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, true)]).await;
    h.email.failing.store(true, Ordering::SeqCst);
    h.sms.failing.store(true, Ordering::SeqCst);

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    assert_eq!(activation.status, ActivationStatus::Pending);
    assert_eq!(shield_status(&h).await, ShieldStatus::PendingVerification);

    let records = h
        .storage
        .list_notifications_for_activation(&activation.id)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].delivery_status, DeliveryStatus::Failed);
    assert!(records[0].delivery_error.is_some());

    let status = h.service.system_status().await.unwrap();
    assert_eq!(status.pending_activations, 1);
    assert_eq!(status.failed_notifications, 1);
}

#[tokio::test]
async fn denial_that_makes_quorum_unreachable_ends_activation() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 2, vec![guardian("g1", 1, true), guardian("g2", 2, true)]).await;

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    let outcome = h
        .service
        .record_guardian_response(
            &activation.verification_token,
            &GuardianId::new("g1"),
            GuardianDecision::Denied,
            Some("spoke to them yesterday".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(outcome.activation.status, ActivationStatus::Denied);
    assert_eq!(outcome.shield_status, ShieldStatus::Inactive);
    assert_eq!(shield_status(&h).await, ShieldStatus::Inactive);
}

#[tokio::test]
async fn concurrent_monitoring_creates_one_activation() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, true)]).await;

    let u = user();
    let (a, b) = tokio::join!(h.service.monitor_user(&u), h.service.monitor_user(&u));
    let started = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(|r| r.activation.is_some())
        .count();

    assert_eq!(started, 1);
    assert_eq!(
        h.storage
            .list_activations_by_status(ActivationStatus::Pending)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn disabled_shield_never_triggers() {
    let h = harness(EmergencyConfig::default());
    h.service.initialize_for_user(&user()).await.unwrap();
    h.storage.upsert_guardian(guardian("g1", 1, true)).await.unwrap();
    h.login.record(user(), h.clock.now() - Duration::days(2000));

    let report = h.service.monitor_user(&user()).await.unwrap();
    assert!(!report.evaluation.should_trigger);
    assert!(report.activation.is_none());
    assert!(h.email.sent().is_empty());
}

#[tokio::test]
async fn manual_trigger_requires_an_eligible_guardian() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, true), guardian("g2", 2, false)]).await;

    let refused = h
        .service
        .manual_trigger(&user(), TriggerType::Medical, &GuardianId::new("g2"), None)
        .await;
    assert!(matches!(refused, Err(EmergencyError::GuardianNotEligible(_))));

    let activation = h
        .service
        .manual_trigger(
            &user(),
            TriggerType::Medical,
            &GuardianId::new("g1"),
            Some("admitted to hospital".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(activation.trigger_type, TriggerType::Medical);
    assert!(activation
        .notes
        .as_deref()
        .unwrap_or_default()
        .contains("admitted to hospital"));

    let duplicate = h
        .service
        .manual_trigger(&user(), TriggerType::Medical, &GuardianId::new("g1"), None)
        .await;
    assert!(matches!(duplicate, Err(EmergencyError::ActivationAlreadyPending(_))));
}

#[tokio::test]
async fn guardians_can_mark_notifications_read() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, true)]).await;

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    let records = h
        .storage
        .list_notifications_for_activation(&activation.id)
        .await
        .unwrap();
    let id = records[0].id;

    assert!(h
        .service
        .mark_notification_read(&id, &GuardianId::new("someone-else"))
        .await
        .is_err());
    h.service
        .mark_notification_read(&id, &GuardianId::new("g1"))
        .await
        .unwrap();

    let records = h
        .storage
        .list_notifications_for_activation(&activation.id)
        .await
        .unwrap();
    assert!(records[0].read_at.is_some());
}

#[tokio::test]
async fn reset_ends_pending_activation() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, true)]).await;

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    let settings = h.service.reset_shield(&user()).await.unwrap();
    assert_eq!(settings.shield_status, ShieldStatus::Inactive);

    let ended = h.storage.get_activation(&activation.id).await.unwrap().unwrap();
    assert_eq!(ended.status, ActivationStatus::Expired);

    let late = h
        .service
        .record_guardian_response(
            &activation.verification_token,
            &GuardianId::new("g1"),
            GuardianDecision::Confirmed,
            None,
        )
        .await;
    assert!(matches!(
        late,
        Err(EmergencyError::TokenInvalidOrExpired { reason: TokenRejection::NotPending })
    ));
    assert_eq!(shield_status(&h).await, ShieldStatus::Inactive);

    let next = h.service.monitor_user(&user()).await.unwrap().activation;
    assert!(next.is_some_and(|a| a.id != activation.id));
}

#[tokio::test]
async fn store_outage_during_notification_keeps_state_consistent() {
    let h = harness(EmergencyConfig::default());
    arm(&h, 1, vec![guardian("g1", 1, true)]).await;
    *h.email.takes_offline.lock().unwrap() = Some(h.storage.clone());

    let activation = h.service.monitor_user(&user()).await.unwrap().activation.unwrap();
    *h.email.takes_offline.lock().unwrap() = None;
    h.storage.set_offline(false);

    assert_eq!(shield_status(&h).await, ShieldStatus::PendingVerification);
    let stored = h.storage.get_activation(&activation.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ActivationStatus::Pending);
    assert!(h
        .storage
        .list_notifications_for_activation(&activation.id)
        .await
        .unwrap()
        .is_empty());

    h.clock.advance(Duration::hours(24));
    let report = h.service.process_escalations(h.clock.now()).await.unwrap();
    assert_eq!(report.escalated, 1);
    assert_eq!(
        h.storage
            .list_notifications_for_activation(&activation.id)
            .await
            .unwrap()
            .len(),
        1
    );
}
