//! In-memory reference implementation for shield storage traits.
//!
//! This adapter is deterministic and test-friendly. Production deployments
//! should use a transactional backend (e.g. PostgreSQL) for source-of-truth data.

use crate::traits::{
    AccessAuditStore, AccessRequestStore, ActivationStore, GuardianStore, HealthCheckStore,
    NotificationStore, ShieldSettingsStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_types::{
    AccessLogEntry, AccessRequest, AccessRequestId, AccessStatus, ActivationId, ActivationStatus,
    DeliveryStatus, EmergencyActivation, Guardian, GuardianId, GuardianNotification,
    GuardianResponse, HealthCheck, NotificationId, ShieldSettings, ShieldStatus, UserId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory shield storage adapter.
#[derive(Default)]
pub struct InMemoryShieldStorage {
    settings: RwLock<HashMap<UserId, ShieldSettings>>,
    guardians: RwLock<HashMap<GuardianId, Guardian>>,
    activations: RwLock<HashMap<ActivationId, EmergencyActivation>>,
    responses: RwLock<Vec<GuardianResponse>>,
    notifications: RwLock<Vec<GuardianNotification>>,
    health_checks: RwLock<Vec<HealthCheck>>,
    access_requests: RwLock<HashMap<AccessRequestId, AccessRequest>>,
    access_logs: RwLock<Vec<AccessLogEntry>>,
    offline: AtomicBool,
}

impl InMemoryShieldStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn read<'a, T>(
        &self,
        lock: &'a RwLock<T>,
        name: &str,
    ) -> StorageResult<RwLockReadGuard<'a, T>> {
        self.ensure_online()?;
        lock.read()
            .map_err(|_| StorageError::Backend(format!("{name} lock poisoned")))
    }

    fn write<'a, T>(
        &self,
        lock: &'a RwLock<T>,
        name: &str,
    ) -> StorageResult<RwLockWriteGuard<'a, T>> {
        self.ensure_online()?;
        lock.write()
            .map_err(|_| StorageError::Backend(format!("{name} lock poisoned")))
    }
}

#[async_trait]
impl ShieldSettingsStore for InMemoryShieldStorage {
    async fn get_settings(&self, user_id: &UserId) -> StorageResult<Option<ShieldSettings>> {
        let guard = self.read(&self.settings, "settings")?;
        Ok(guard.get(user_id).cloned())
    }

    async fn insert_settings_if_absent(&self, settings: ShieldSettings) -> StorageResult<bool> {
        let mut guard = self.write(&self.settings, "settings")?;
        if guard.contains_key(&settings.user_id) {
            return Ok(false);
        }
        guard.insert(settings.user_id.clone(), settings);
        Ok(true)
    }

    async fn upsert_settings(&self, settings: ShieldSettings) -> StorageResult<()> {
        let mut guard = self.write(&self.settings, "settings")?;
        guard.insert(settings.user_id.clone(), settings);
        Ok(())
    }

    async fn transition_shield_status(
        &self,
        user_id: &UserId,
        expected_from: ShieldStatus,
        to: ShieldStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self.write(&self.settings, "settings")?;
        let record = guard
            .get_mut(user_id)
            .ok_or_else(|| StorageError::NotFound(format!("shield settings for {user_id}")))?;

        if record.shield_status != expected_from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid shield transition: expected {}, found {}",
                expected_from, record.shield_status
            )));
        }
        if !expected_from.can_transition_to(to) {
            return Err(StorageError::InvariantViolation(format!(
                "shield status cannot move from {expected_from} to {to}"
            )));
        }

        record.shield_status = to;
        record.updated_at = updated_at;
        Ok(())
    }

    async fn touch_activity_check(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self.write(&self.settings, "settings")?;
        if let Some(record) = guard.get_mut(user_id) {
            record.last_activity_check = Some(at);
        }
        Ok(())
    }

    async fn list_enabled_settings(&self) -> StorageResult<Vec<ShieldSettings>> {
        let guard = self.read(&self.settings, "settings")?;
        let mut values = guard
            .values()
            .filter(|s| s.is_enabled)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(values)
    }
}

#[async_trait]
impl GuardianStore for InMemoryShieldStorage {
    async fn upsert_guardian(&self, guardian: Guardian) -> StorageResult<()> {
        let mut guard = self.write(&self.guardians, "guardians")?;
        guard.insert(guardian.id.clone(), guardian);
        Ok(())
    }

    async fn get_guardian(&self, guardian_id: &GuardianId) -> StorageResult<Option<Guardian>> {
        let guard = self.read(&self.guardians, "guardians")?;
        Ok(guard.get(guardian_id).cloned())
    }

    async fn list_guardians(&self, user_id: &UserId) -> StorageResult<Vec<Guardian>> {
        let guard = self.read(&self.guardians, "guardians")?;
        let mut values = guard
            .values()
            .filter(|g| &g.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.priority().cmp(&b.priority()).then(a.id.cmp(&b.id)));
        Ok(values)
    }
}

#[async_trait]
impl ActivationStore for InMemoryShieldStorage {
    async fn create_activation(&self, activation: EmergencyActivation) -> StorageResult<()> {
        let mut guard = self.write(&self.activations, "activations")?;

        if guard
            .values()
            .any(|a| a.user_id == activation.user_id && a.is_pending())
        {
            return Err(StorageError::Conflict(format!(
                "{} already has a pending activation",
                activation.user_id
            )));
        }
        if guard.contains_key(&activation.id) {
            return Err(StorageError::Conflict(format!(
                "activation {} already exists",
                activation.id
            )));
        }

        guard.insert(activation.id, activation);
        Ok(())
    }

    async fn get_activation(
        &self,
        id: &ActivationId,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let guard = self.read(&self.activations, "activations")?;
        Ok(guard.get(id).cloned())
    }

    async fn find_activation_by_token(
        &self,
        token: &str,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let guard = self.read(&self.activations, "activations")?;
        Ok(guard
            .values()
            .find(|a| a.verification_token == token)
            .cloned())
    }

    async fn pending_activation_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let guard = self.read(&self.activations, "activations")?;
        Ok(guard
            .values()
            .find(|a| &a.user_id == user_id && a.is_pending())
            .cloned())
    }

    async fn latest_activation_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let guard = self.read(&self.activations, "activations")?;
        Ok(guard
            .values()
            .filter(|a| &a.user_id == user_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn update_pending_activation(
        &self,
        activation: EmergencyActivation,
    ) -> StorageResult<()> {
        let mut guard = self.write(&self.activations, "activations")?;
        let record = guard
            .get_mut(&activation.id)
            .ok_or_else(|| StorageError::NotFound(format!("activation {}", activation.id)))?;

        if !record.is_pending() {
            return Err(StorageError::InvariantViolation(format!(
                "activation {} is {}, not pending",
                activation.id, record.status
            )));
        }

        *record = activation;
        Ok(())
    }

    async fn list_activations_by_status(
        &self,
        status: ActivationStatus,
    ) -> StorageResult<Vec<EmergencyActivation>> {
        let guard = self.read(&self.activations, "activations")?;
        let mut values = guard
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }

    async fn record_response(&self, response: GuardianResponse) -> StorageResult<()> {
        let mut guard = self.write(&self.responses, "responses")?;
        if guard.iter().any(|r| {
            r.activation_id == response.activation_id && r.guardian_id == response.guardian_id
        }) {
            return Err(StorageError::Conflict(format!(
                "{} already responded to {}",
                response.guardian_id, response.activation_id
            )));
        }
        guard.push(response);
        Ok(())
    }

    async fn list_responses(
        &self,
        activation_id: &ActivationId,
    ) -> StorageResult<Vec<GuardianResponse>> {
        let guard = self.read(&self.responses, "responses")?;
        Ok(guard
            .iter()
            .filter(|r| &r.activation_id == activation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for InMemoryShieldStorage {
    async fn insert_notification(&self, notification: GuardianNotification) -> StorageResult<()> {
        let mut guard = self.write(&self.notifications, "notifications")?;
        guard.push(notification);
        Ok(())
    }

    async fn list_notifications_for_activation(
        &self,
        activation_id: &ActivationId,
    ) -> StorageResult<Vec<GuardianNotification>> {
        let guard = self.read(&self.notifications, "notifications")?;
        Ok(guard
            .iter()
            .filter(|n| n.activation_id.as_ref() == Some(activation_id))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(
        &self,
        id: &NotificationId,
        guardian_id: &GuardianId,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self.write(&self.notifications, "notifications")?;
        let record = guard
            .iter_mut()
            .find(|n| &n.id == id && &n.guardian_id == guardian_id)
            .ok_or_else(|| StorageError::NotFound(format!("{id} for {guardian_id}")))?;
        record.read_at = Some(at);
        Ok(())
    }

    async fn count_notifications(&self, status: DeliveryStatus) -> StorageResult<usize> {
        let guard = self.read(&self.notifications, "notifications")?;
        Ok(guard.iter().filter(|n| n.delivery_status == status).count())
    }
}

#[async_trait]
impl HealthCheckStore for InMemoryShieldStorage {
    async fn append_health_check(&self, check: HealthCheck) -> StorageResult<()> {
        let mut guard = self.write(&self.health_checks, "health checks")?;
        guard.push(check);
        Ok(())
    }

    async fn recent_health_checks(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StorageResult<Vec<HealthCheck>> {
        let guard = self.read(&self.health_checks, "health checks")?;
        let mut values = guard
            .iter()
            .filter(|c| &c.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        values.truncate(limit);
        Ok(values)
    }
}

#[async_trait]
impl AccessRequestStore for InMemoryShieldStorage {
    async fn insert_access_request(&self, request: AccessRequest) -> StorageResult<()> {
        let mut guard = self.write(&self.access_requests, "access requests")?;
        if guard.contains_key(&request.id) {
            return Err(StorageError::Conflict(format!(
                "access request {} already exists",
                request.id
            )));
        }
        guard.insert(request.id, request);
        Ok(())
    }

    async fn get_access_request(
        &self,
        id: &AccessRequestId,
    ) -> StorageResult<Option<AccessRequest>> {
        let guard = self.read(&self.access_requests, "access requests")?;
        Ok(guard.get(id).cloned())
    }

    async fn update_access_request(
        &self,
        request: AccessRequest,
        expected_from: AccessStatus,
    ) -> StorageResult<()> {
        let mut guard = self.write(&self.access_requests, "access requests")?;
        let record = guard
            .get_mut(&request.id)
            .ok_or_else(|| StorageError::NotFound(format!("access request {}", request.id)))?;

        if record.status != expected_from {
            return Err(StorageError::InvariantViolation(format!(
                "invalid access transition: expected {}, found {}",
                expected_from, record.status
            )));
        }

        *record = request;
        Ok(())
    }

    async fn list_access_requests(
        &self,
        status: Option<AccessStatus>,
    ) -> StorageResult<Vec<AccessRequest>> {
        let guard = self.read(&self.access_requests, "access requests")?;
        let mut values = guard
            .values()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(values)
    }
}

#[async_trait]
impl AccessAuditStore for InMemoryShieldStorage {
    async fn append_access_log(&self, entry: AccessLogEntry) -> StorageResult<()> {
        let mut guard = self.write(&self.access_logs, "access logs")?;
        guard.push(entry);
        Ok(())
    }

    async fn list_access_logs(
        &self,
        request_id: Option<&AccessRequestId>,
    ) -> StorageResult<Vec<AccessLogEntry>> {
        let guard = self.read(&self.access_logs, "access logs")?;
        Ok(guard
            .iter()
            .filter(|e| request_id.map(|id| e.request_id.as_ref() == Some(id)).unwrap_or(true))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use shield_types::{GuardianPermissions, HealthCheckKind, HealthCheckOutcome, TriggerType};

    fn activation(user: &str, now: DateTime<Utc>) -> EmergencyActivation {
        EmergencyActivation {
            id: ActivationId::generate(),
            user_id: UserId::new(user),
            guardian_id: GuardianId::new("g1"),
            trigger_type: TriggerType::InactivityDetected,
            verification_token: format!("token-{}", uuid::Uuid::new_v4()),
            token_expires_at: now + Duration::days(7),
            status: ActivationStatus::Pending,
            guardian_email: "g1@example.com".to_string(),
            guardian_name: "Guardian One".to_string(),
            notes: None,
            created_at: now,
            updated_at: now,
            escalation_round: 0,
            next_escalation_at: None,
            notified_guardians: vec![],
        }
    }

    #[tokio::test]
    async fn second_pending_activation_conflicts() {
        let storage = InMemoryShieldStorage::new();
        let now = Utc::now();
        storage.create_activation(activation("u1", now)).await.unwrap();

        let result = storage.create_activation(activation("u1", now)).await;
        assert!(matches!(result, Err(StorageError::Conflict(_))));

        // a different user is unaffected
        storage.create_activation(activation("u2", now)).await.unwrap();
    }

    #[tokio::test]
    async fn new_activation_allowed_once_previous_resolved() {
        let storage = InMemoryShieldStorage::new();
        let now = Utc::now();
        let mut first = activation("u1", now);
        storage.create_activation(first.clone()).await.unwrap();

        first.status = ActivationStatus::Expired;
        storage.update_pending_activation(first.clone()).await.unwrap();
        storage.create_activation(activation("u1", now)).await.unwrap();

        // the expired record can no longer be rewritten
        let result = storage.update_pending_activation(first).await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn shield_transition_checks_expected_state() {
        let storage = InMemoryShieldStorage::new();
        let user = UserId::new("u1");
        storage
            .upsert_settings(ShieldSettings::new_default(user.clone(), Utc::now()))
            .await
            .unwrap();

        let result = storage
            .transition_shield_status(
                &user,
                ShieldStatus::PendingVerification,
                ShieldStatus::Active,
                Utc::now(),
            )
            .await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));

        storage
            .transition_shield_status(
                &user,
                ShieldStatus::Inactive,
                ShieldStatus::PendingVerification,
                Utc::now(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_response_conflicts() {
        let storage = InMemoryShieldStorage::new();
        let response = GuardianResponse {
            activation_id: ActivationId::generate(),
            guardian_id: GuardianId::new("g1"),
            decision: shield_types::GuardianDecision::Confirmed,
            notes: None,
            responded_at: Utc::now(),
        };
        storage.record_response(response.clone()).await.unwrap();
        assert!(matches!(
            storage.record_response(response).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn guardians_listed_by_priority() {
        let storage = InMemoryShieldStorage::new();
        for (id, priority) in [("late", 3), ("first", 1), ("second", 2)] {
            storage
                .upsert_guardian(Guardian {
                    id: GuardianId::new(id),
                    user_id: UserId::new("u1"),
                    name: id.to_string(),
                    email: format!("{id}@example.com"),
                    phone: None,
                    push_token: None,
                    permissions: GuardianPermissions {
                        emergency_contact_priority: priority,
                        ..Default::default()
                    },
                    is_active: true,
                })
                .await
                .unwrap();
        }

        let ids = storage
            .list_guardians(&UserId::new("u1"))
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id.as_str().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["first", "second", "late"]);
    }

    #[tokio::test]
    async fn health_checks_most_recent_first() {
        let storage = InMemoryShieldStorage::new();
        let user = UserId::new("u1");
        let now = Utc::now();
        for offset in 0..5 {
            storage
                .append_health_check(HealthCheck {
                    user_id: user.clone(),
                    kind: HealthCheckKind::ApiPing,
                    outcome: HealthCheckOutcome::Missed,
                    scheduled_at: now - Duration::days(offset),
                    responded_at: None,
                })
                .await
                .unwrap();
        }

        let checks = storage.recent_health_checks(&user, 3).await.unwrap();
        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0].scheduled_at, now);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let storage = InMemoryShieldStorage::new();
        storage.set_offline(true);
        let result = storage.get_settings(&UserId::new("u1")).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));

        storage.set_offline(false);
        assert!(storage.get_settings(&UserId::new("u1")).await.unwrap().is_none());
    }
}
