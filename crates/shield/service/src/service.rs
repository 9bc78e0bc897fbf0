//! Emergency service.
//!
//! Ties activity tracking, trigger evaluation, guardian notification and
//! access control together. State lives in the store; the service itself
//! only holds the per-user locks that serialize activation work.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use shield_access::AccessControl;
use shield_activity::ActivityTracker;
use shield_notifier::{
    GuardianContact, GuardianNotifier, NotificationOutcome, NotificationRequest, Template,
};
use shield_storage::{
    ActivationStore, GuardianStore, HealthCheckStore, NotificationStore, ShieldSettingsStore,
    ShieldStorage, StorageError,
};
use shield_trigger::{TriggerEvaluation, TriggerEvaluator};
use shield_types::{
    ActivationId, ActivationStatus, Clock, DeliveryStatus, EmergencyActivation, Guardian,
    GuardianId, GuardianResponse, HealthCheck, HealthCheckKind, HealthCheckOutcome,
    NotificationId, NotificationKind, ShieldSettings, ShieldStatus, TriggerType, UserId,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EmergencyConfig;
use crate::error::{EmergencyError, EmergencyResult};
use crate::messages::{generate_token, notification_records, template_data, urgency_for};

/// Result of a periodic check on one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    pub evaluation: TriggerEvaluation,
    /// Severity is high or critical.
    pub should_alert: bool,
    /// Activation started by this check, if any.
    pub activation: Option<EmergencyActivation>,
}

/// The latest activation for a user and where its vote stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationStatusReport {
    pub activation: EmergencyActivation,
    pub responses: Vec<GuardianResponse>,
    pub confirmations: usize,
    pub required_confirmations: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub enabled_shields: usize,
    pub pending_activations: usize,
    pub pending_notifications: usize,
    pub failed_notifications: usize,
    pub checked_at: DateTime<Utc>,
}

/// Orchestrates emergency activations.
pub struct EmergencyService {
    pub(crate) storage: Arc<dyn ShieldStorage>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) evaluator: TriggerEvaluator,
    pub(crate) notifier: Arc<GuardianNotifier>,
    pub(crate) access: AccessControl,
    pub(crate) config: EmergencyConfig,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl EmergencyService {
    pub fn new(
        storage: Arc<dyn ShieldStorage>,
        clock: Arc<dyn Clock>,
        tracker: Arc<ActivityTracker>,
        notifier: Arc<GuardianNotifier>,
        config: EmergencyConfig,
    ) -> Self {
        let evaluator = TriggerEvaluator::new(storage.clone(), tracker, clock.clone())
            .with_suppression_window(config.suppression_window());
        let access = AccessControl::new(storage.clone(), clock.clone());
        Self {
            storage,
            clock,
            evaluator,
            notifier,
            access,
            config,
            user_locks: DashMap::new(),
        }
    }

    /// Access control sharing this service's store and clock.
    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn config(&self) -> &EmergencyConfig {
        &self.config
    }

    pub(crate) fn user_lock(&self, user_id: &UserId) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id.clone()).or_default().clone()
    }

    /// Create default settings for `user_id` if it has none. Existing
    /// settings are returned untouched.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn initialize_for_user(&self, user_id: &UserId) -> EmergencyResult<ShieldSettings> {
        let defaults = ShieldSettings::new_default(user_id.clone(), self.clock.now());
        if self.storage.insert_settings_if_absent(defaults).await? {
            info!("shield settings initialised");
        }
        self.settings(user_id).await
    }

    /// Append a health-check result.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn record_health_check(
        &self,
        user_id: &UserId,
        kind: HealthCheckKind,
        responded: bool,
    ) -> EmergencyResult<HealthCheck> {
        let now = self.clock.now();
        let check = HealthCheck {
            user_id: user_id.clone(),
            kind,
            outcome: if responded {
                HealthCheckOutcome::Responded
            } else {
                HealthCheckOutcome::Missed
            },
            scheduled_at: now,
            responded_at: responded.then_some(now),
        };
        self.storage.append_health_check(check.clone()).await?;
        debug!(kind = %kind, outcome = %check.outcome, "health check recorded");
        Ok(check)
    }

    /// Evaluate `user_id` and start an activation when warranted.
    ///
    /// An activation that raced in from elsewhere is not an error; the
    /// report simply carries no new activation.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn monitor_user(&self, user_id: &UserId) -> EmergencyResult<MonitorReport> {
        let evaluation = self.evaluator.evaluate(user_id).await?;

        if evaluation.snapshot.is_some() {
            self.storage
                .touch_activity_check(user_id, evaluation.evaluated_at)
                .await?;
        }

        let activation = if evaluation.should_trigger {
            match self.handle_emergency(&evaluation).await {
                Ok(activation) => Some(activation),
                Err(EmergencyError::ActivationAlreadyPending(_)) => {
                    info!("activation already in progress");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        let should_alert = evaluation.severity.should_alert();
        if should_alert {
            warn!(
                severity = %evaluation.severity,
                reasons = ?evaluation.reasons,
                "guardian shield alert"
            );
        }

        Ok(MonitorReport {
            evaluation,
            should_alert,
            activation,
        })
    }

    /// Start an activation for a triggering evaluation.
    pub async fn handle_emergency(
        &self,
        evaluation: &TriggerEvaluation,
    ) -> EmergencyResult<EmergencyActivation> {
        let trigger_type = match evaluation.trigger_type {
            Some(trigger_type) if evaluation.should_trigger => trigger_type,
            _ => return Err(EmergencyError::NotTriggered(evaluation.user_id.clone())),
        };
        let notes = (!evaluation.reasons.is_empty()).then(|| evaluation.reasons.join("; "));
        self.start_activation(&evaluation.user_id, trigger_type, notes)
            .await
    }

    /// Start an activation on a guardian's say-so, without evaluation.
    #[instrument(skip(self, notes), fields(user_id = %user_id, guardian_id = %guardian_id))]
    pub async fn manual_trigger(
        &self,
        user_id: &UserId,
        trigger_type: TriggerType,
        guardian_id: &GuardianId,
        notes: Option<String>,
    ) -> EmergencyResult<EmergencyActivation> {
        let eligible = self
            .storage
            .get_guardian(guardian_id)
            .await?
            .map(|g| &g.user_id == user_id && g.can_trigger())
            .unwrap_or(false);
        if !eligible {
            return Err(EmergencyError::GuardianNotEligible(guardian_id.clone()));
        }

        let notes = Some(match notes {
            Some(notes) => format!("Requested by {guardian_id}: {notes}"),
            None => format!("Requested by {guardian_id}"),
        });
        self.start_activation(user_id, trigger_type, notes).await
    }

    #[instrument(skip(self, notes), fields(user_id = %user_id, trigger_type = %trigger_type))]
    async fn start_activation(
        &self,
        user_id: &UserId,
        trigger_type: TriggerType,
        notes: Option<String>,
    ) -> EmergencyResult<EmergencyActivation> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let settings = self.settings(user_id).await?;
        if self
            .storage
            .pending_activation_for_user(user_id)
            .await?
            .is_some()
        {
            return Err(EmergencyError::ActivationAlreadyPending(user_id.clone()));
        }

        let eligible = self.eligible_guardians(user_id).await?;
        let count = self
            .config
            .initial_notify_count
            .max(settings.quorum() as usize)
            .min(eligible.len());
        let Some(first) = eligible.first() else {
            return Err(EmergencyError::NoEligibleGuardians(user_id.clone()));
        };
        let selected = &eligible[..count];

        let now = self.clock.now();
        let activation = EmergencyActivation {
            id: ActivationId::generate(),
            user_id: user_id.clone(),
            guardian_id: first.id.clone(),
            trigger_type,
            verification_token: generate_token(),
            token_expires_at: now + self.config.verification_timeout(),
            status: ActivationStatus::Pending,
            guardian_email: first.email.clone(),
            guardian_name: first.name.clone(),
            notes,
            created_at: now,
            updated_at: now,
            escalation_round: 0,
            next_escalation_at: Some(now + self.config.escalation_response_window()),
            notified_guardians: selected.iter().map(|g| g.id.clone()).collect(),
        };

        match self.storage.create_activation(activation.clone()).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(EmergencyError::ActivationAlreadyPending(user_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }
        info!(
            activation_id = %activation.id,
            guardians = selected.len(),
            "emergency activation created"
        );

        // The shield records the pending activation before anything reaches
        // a guardian.
        if settings.shield_status != ShieldStatus::PendingVerification
            && settings
                .shield_status
                .can_transition_to(ShieldStatus::PendingVerification)
        {
            self.storage
                .transition_shield_status(
                    user_id,
                    settings.shield_status,
                    ShieldStatus::PendingVerification,
                    now,
                )
                .await?;
        }

        self.notify(
            &activation,
            selected,
            Template::activation_request(),
            NotificationKind::ActivationRequest,
            "Emergency Activation Request",
        )
        .await;

        Ok(activation)
    }

    /// Send one notify round and persist a record per guardian.
    ///
    /// Neither delivery failures nor a failure to store the records abort
    /// the round: the activation stays pending and escalation picks it up.
    pub(crate) async fn notify(
        &self,
        activation: &EmergencyActivation,
        guardians: &[Guardian],
        template: Template,
        kind: NotificationKind,
        title: &str,
    ) -> Option<NotificationOutcome> {
        let request = NotificationRequest {
            urgency: urgency_for(activation.trigger_type.priority()),
            template,
            short_template: Some(Template::short_notice()),
            data: template_data(activation, &self.config.verification_base_url),
            recipients: guardians.iter().map(GuardianContact::from).collect(),
        };

        let outcome = match self.notifier.notify_guardians(&request).await {
            Ok(outcome) => {
                if outcome.nobody_reached() {
                    warn!(activation_id = %activation.id, "no guardian could be reached");
                } else if outcome.partial {
                    warn!(
                        activation_id = %activation.id,
                        failures = outcome.failures.len(),
                        "guardian notification partially failed"
                    );
                }
                Some(outcome)
            }
            Err(err) => {
                error!(
                    activation_id = %activation.id,
                    error = %err,
                    "guardian notification failed"
                );
                None
            }
        };

        let now = self.clock.now();
        let records =
            notification_records(activation, guardians, kind, title, outcome.as_ref(), now);
        for record in records {
            let notification_id = record.id;
            if let Err(err) = self.storage.insert_notification(record).await {
                error!(
                    activation_id = %activation.id,
                    notification_id = %notification_id,
                    error = %err,
                    "failed to store notification record"
                );
            }
        }
        outcome
    }

    /// The most recent activation for `user_id` with its responses.
    pub async fn activation_status(
        &self,
        user_id: &UserId,
    ) -> EmergencyResult<Option<ActivationStatusReport>> {
        let Some(activation) = self.storage.latest_activation_for_user(user_id).await? else {
            return Ok(None);
        };
        let settings = self.settings(user_id).await?;
        let responses = self.storage.list_responses(&activation.id).await?;
        let confirmations = crate::verification::distinct_confirmations(&responses);

        Ok(Some(ActivationStatusReport {
            activation,
            responses,
            confirmations,
            required_confirmations: settings.quorum(),
        }))
    }

    /// Explicitly return the shield to inactive.
    ///
    /// A pending activation is expired first, so its token can no longer
    /// move the shield to active.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn reset_shield(&self, user_id: &UserId) -> EmergencyResult<ShieldSettings> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        if let Some(mut pending) = self.storage.pending_activation_for_user(user_id).await? {
            let now = self.clock.now();
            pending.status = ActivationStatus::Expired;
            pending.next_escalation_at = None;
            pending.updated_at = now;
            self.storage
                .update_pending_activation(pending.clone())
                .await?;
            info!(activation_id = %pending.id, "pending activation ended by reset");
        }

        let settings = self.settings(user_id).await?;
        if settings.shield_status != ShieldStatus::Inactive {
            self.storage
                .transition_shield_status(
                    user_id,
                    settings.shield_status,
                    ShieldStatus::Inactive,
                    self.clock.now(),
                )
                .await?;
            info!(from = %settings.shield_status, "shield reset");
        }
        self.settings(user_id).await
    }

    pub async fn system_status(&self) -> EmergencyResult<SystemStatus> {
        Ok(SystemStatus {
            enabled_shields: self.storage.list_enabled_settings().await?.len(),
            pending_activations: self
                .storage
                .list_activations_by_status(ActivationStatus::Pending)
                .await?
                .len(),
            pending_notifications: self
                .storage
                .count_notifications(DeliveryStatus::Pending)
                .await?,
            failed_notifications: self
                .storage
                .count_notifications(DeliveryStatus::Failed)
                .await?,
            checked_at: self.clock.now(),
        })
    }

    pub async fn mark_notification_read(
        &self,
        id: &NotificationId,
        guardian_id: &GuardianId,
    ) -> EmergencyResult<()> {
        self.storage
            .mark_notification_read(id, guardian_id, self.clock.now())
            .await?;
        Ok(())
    }

    pub(crate) async fn settings(&self, user_id: &UserId) -> EmergencyResult<ShieldSettings> {
        self.storage
            .get_settings(user_id)
            .await?
            .ok_or_else(|| EmergencyError::SettingsNotFound(user_id.clone()))
    }

    /// Active guardians with trigger rights, highest priority first.
    pub(crate) async fn eligible_guardians(
        &self,
        user_id: &UserId,
    ) -> EmergencyResult<Vec<Guardian>> {
        Ok(self
            .storage
            .list_guardians(user_id)
            .await?
            .into_iter()
            .filter(Guardian::can_trigger)
            .collect())
    }

    /// Move the shield back to inactive after an activation ends without
    /// approval. An already active shield is left alone.
    pub(crate) async fn release_shield(&self, user_id: &UserId) -> EmergencyResult<()> {
        let settings = self.settings(user_id).await?;
        if settings.shield_status == ShieldStatus::PendingVerification {
            self.storage
                .transition_shield_status(
                    user_id,
                    ShieldStatus::PendingVerification,
                    ShieldStatus::Inactive,
                    self.clock.now(),
                )
                .await?;
        }
        Ok(())
    }
}
