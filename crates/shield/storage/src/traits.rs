use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shield_types::{
    AccessLogEntry, AccessRequest, AccessRequestId, AccessStatus, ActivationId, ActivationStatus,
    DeliveryStatus, EmergencyActivation, Guardian, GuardianId, GuardianNotification,
    GuardianResponse, HealthCheck, NotificationId, ShieldSettings, ShieldStatus, UserId,
};

/// Storage interface for `shield_settings`.
#[async_trait]
pub trait ShieldSettingsStore: Send + Sync {
    async fn get_settings(&self, user_id: &UserId) -> StorageResult<Option<ShieldSettings>>;

    /// Insert settings if none exist. Returns `false` when a row was already present.
    async fn insert_settings_if_absent(&self, settings: ShieldSettings) -> StorageResult<bool>;

    async fn upsert_settings(&self, settings: ShieldSettings) -> StorageResult<()>;

    /// Compare-and-swap the shield status.
    async fn transition_shield_status(
        &self,
        user_id: &UserId,
        expected_from: ShieldStatus,
        to: ShieldStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn touch_activity_check(&self, user_id: &UserId, at: DateTime<Utc>)
        -> StorageResult<()>;

    async fn list_enabled_settings(&self) -> StorageResult<Vec<ShieldSettings>>;
}

/// Storage interface for `guardians`.
#[async_trait]
pub trait GuardianStore: Send + Sync {
    async fn upsert_guardian(&self, guardian: Guardian) -> StorageResult<()>;
    async fn get_guardian(&self, guardian_id: &GuardianId) -> StorageResult<Option<Guardian>>;
    async fn list_guardians(&self, user_id: &UserId) -> StorageResult<Vec<Guardian>>;
}

/// Storage interface for `family_shield_activation_log` and guardian responses.
#[async_trait]
pub trait ActivationStore: Send + Sync {
    /// Insert a new pending activation.
    ///
    /// Fails with `Conflict` if the user already has a pending activation.
    async fn create_activation(&self, activation: EmergencyActivation) -> StorageResult<()>;

    async fn get_activation(&self, id: &ActivationId) -> StorageResult<Option<EmergencyActivation>>;

    async fn find_activation_by_token(
        &self,
        token: &str,
    ) -> StorageResult<Option<EmergencyActivation>>;

    async fn pending_activation_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Option<EmergencyActivation>>;

    async fn latest_activation_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Option<EmergencyActivation>>;

    /// Replace a pending activation. Fails with `InvariantViolation` if the
    /// stored record is no longer pending.
    async fn update_pending_activation(&self, activation: EmergencyActivation)
        -> StorageResult<()>;

    async fn list_activations_by_status(
        &self,
        status: ActivationStatus,
    ) -> StorageResult<Vec<EmergencyActivation>>;

    /// Record a guardian response. Fails with `Conflict` if this guardian
    /// already answered this activation.
    async fn record_response(&self, response: GuardianResponse) -> StorageResult<()>;

    async fn list_responses(&self, activation_id: &ActivationId)
        -> StorageResult<Vec<GuardianResponse>>;
}

/// Storage interface for `guardian_notifications`.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: GuardianNotification) -> StorageResult<()>;

    async fn list_notifications_for_activation(
        &self,
        activation_id: &ActivationId,
    ) -> StorageResult<Vec<GuardianNotification>>;

    async fn mark_notification_read(
        &self,
        id: &NotificationId,
        guardian_id: &GuardianId,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    async fn count_notifications(&self, status: DeliveryStatus) -> StorageResult<usize>;
}

/// Storage interface for `user_health_checks`.
#[async_trait]
pub trait HealthCheckStore: Send + Sync {
    async fn append_health_check(&self, check: HealthCheck) -> StorageResult<()>;

    /// Most recent first.
    async fn recent_health_checks(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StorageResult<Vec<HealthCheck>>;
}

/// Storage interface for guardian access requests.
#[async_trait]
pub trait AccessRequestStore: Send + Sync {
    async fn insert_access_request(&self, request: AccessRequest) -> StorageResult<()>;

    async fn get_access_request(
        &self,
        id: &AccessRequestId,
    ) -> StorageResult<Option<AccessRequest>>;

    /// Replace a request whose stored status still equals `expected_from`.
    async fn update_access_request(
        &self,
        request: AccessRequest,
        expected_from: AccessStatus,
    ) -> StorageResult<()>;

    async fn list_access_requests(
        &self,
        status: Option<AccessStatus>,
    ) -> StorageResult<Vec<AccessRequest>>;
}

/// Storage interface for the append-only `emergency_access_audit`.
#[async_trait]
pub trait AccessAuditStore: Send + Sync {
    async fn append_access_log(&self, entry: AccessLogEntry) -> StorageResult<()>;

    /// Oldest first. `None` returns every entry.
    async fn list_access_logs(
        &self,
        request_id: Option<&AccessRequestId>,
    ) -> StorageResult<Vec<AccessLogEntry>>;
}

/// Unified storage bundle used by the shield components.
pub trait ShieldStorage:
    ShieldSettingsStore
    + GuardianStore
    + ActivationStore
    + NotificationStore
    + HealthCheckStore
    + AccessRequestStore
    + AccessAuditStore
    + Send
    + Sync
{
}

impl<T> ShieldStorage for T where
    T: ShieldSettingsStore
        + GuardianStore
        + ActivationStore
        + NotificationStore
        + HealthCheckStore
        + AccessRequestStore
        + AccessAuditStore
        + Send
        + Sync
{
}
