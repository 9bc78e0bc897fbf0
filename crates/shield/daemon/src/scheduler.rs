//! Monitoring and escalation loop

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use shield_service::{EmergencyError, EmergencyService};
use shield_storage::{ShieldSettingsStore, ShieldStorage};
use shield_types::Clock;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::SchedulerConfig;

/// Drives periodic monitoring and escalation sweeps
pub struct Scheduler {
    config: SchedulerConfig,
    storage: Arc<dyn ShieldStorage>,
    service: Arc<EmergencyService>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        storage: Arc<dyn ShieldStorage>,
        service: Arc<EmergencyService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            storage,
            service,
            clock,
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut monitor = interval(Duration::from_secs(self.config.monitor_interval_secs.max(1)));
        let mut escalation =
            interval(Duration::from_secs(self.config.escalation_interval_secs.max(1)));
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        escalation.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            monitor_interval_secs = self.config.monitor_interval_secs,
            escalation_interval_secs = self.config.escalation_interval_secs,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = monitor.tick() => self.monitor_all().await,
                _ = escalation.tick() => self.escalate().await,
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Evaluate every enabled shield
    pub async fn monitor_all(&self) {
        let settings = match self.storage.list_enabled_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list enabled shields");
                return;
            }
        };

        futures::stream::iter(settings)
            .for_each_concurrent(self.config.max_concurrent_users.max(1), |s| async move {
                match self.service.monitor_user(&s.user_id).await {
                    Ok(report) => {
                        if let Some(activation) = report.activation {
                            tracing::info!(
                                user_id = %s.user_id,
                                activation_id = %activation.id,
                                "Emergency activation started"
                            );
                        }
                    }
                    Err(EmergencyError::NoEligibleGuardians(user_id)) => {
                        tracing::warn!(
                            user_id = %user_id,
                            "Trigger fired but no guardian can confirm"
                        );
                    }
                    Err(e) => {
                        tracing::error!(user_id = %s.user_id, error = %e, "Monitoring failed");
                    }
                }
            })
            .await;
    }

    /// Escalate or expire overdue activations
    pub async fn escalate(&self) {
        if let Err(e) = self.service.process_escalations(self.clock.now()).await {
            tracing::error!(error = %e, "Escalation sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use shield_activity::{ActivityTracker, SignalKind, StaticActivitySource};
    use shield_notifier::{GuardianNotifier, LoggingChannel, NotifierConfig};
    use shield_service::EmergencyConfig;
    use shield_storage::memory::InMemoryShieldStorage;
    use shield_storage::{ActivationStore, GuardianStore};
    use shield_types::{
        ActivationStatus, DeliveryMethod, Guardian, GuardianId, GuardianPermissions, ManualClock,
        ShieldSettings, UserId,
    };

    async fn scheduler() -> (Scheduler, Arc<InMemoryShieldStorage>, Arc<ManualClock>) {
        let storage = Arc::new(InMemoryShieldStorage::new());
        let clock = Arc::new(ManualClock::default());
        let user = UserId::new("u1");

        let mut settings = ShieldSettings::new_default(user.clone(), clock.now());
        settings.is_enabled = true;
        storage.upsert_settings(settings).await.unwrap();
        storage
            .upsert_guardian(Guardian {
                id: GuardianId::new("g1"),
                user_id: user.clone(),
                name: "Grace".to_string(),
                email: "grace@example.com".to_string(),
                phone: None,
                push_token: None,
                permissions: GuardianPermissions {
                    can_trigger_emergency: true,
                    ..GuardianPermissions::default()
                },
                is_active: true,
            })
            .await
            .unwrap();

        let login = Arc::new(StaticActivitySource::new(SignalKind::Login));
        login.record(user, clock.now() - ChronoDuration::days(365));
        let tracker =
            Arc::new(ActivityTracker::new(storage.clone(), clock.clone()).with_source(login));
        let notifier = Arc::new(
            GuardianNotifier::new(NotifierConfig::default())
                .with_channel(Arc::new(LoggingChannel::new(DeliveryMethod::Email)))
                .with_channel(Arc::new(LoggingChannel::new(DeliveryMethod::Sms))),
        );
        let service = Arc::new(EmergencyService::new(
            storage.clone(),
            clock.clone(),
            tracker,
            notifier,
            EmergencyConfig::default(),
        ));

        let scheduler = Scheduler::new(
            SchedulerConfig::default(),
            storage.clone(),
            service,
            clock.clone(),
        );
        (scheduler, storage, clock)
    }

    #[tokio::test]
    async fn monitoring_pass_starts_one_activation() {
        let (scheduler, storage, _) = scheduler().await;

        scheduler.monitor_all().await;
        scheduler.monitor_all().await;

        let pending = storage
            .list_activations_by_status(ActivationStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn sweep_expires_after_token_lifetime() {
        let (scheduler, storage, clock) = scheduler().await;
        scheduler.monitor_all().await;

        clock.advance(ChronoDuration::days(8));
        scheduler.escalate().await;

        assert!(storage
            .list_activations_by_status(ActivationStatus::Pending)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            storage
                .list_activations_by_status(ActivationStatus::Expired)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let (scheduler, _, _) = scheduler().await;
        scheduler
            .run(tokio::time::sleep(Duration::from_secs(10)))
            .await;
    }
}
