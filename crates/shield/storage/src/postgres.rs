//! PostgreSQL adapter for shield storage.
//!
//! Scalar columns carry everything the queries filter or order on; the full
//! record is kept alongside as JSONB. A partial unique index on
//! `family_shield_activation_log (user_id) WHERE status = 'pending'` enforces
//! at most one pending activation per user.

use crate::traits::{
    AccessAuditStore, AccessRequestStore, ActivationStore, GuardianStore, HealthCheckStore,
    NotificationStore, ShieldSettingsStore,
};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shield_types::{
    AccessLogEntry, AccessRequest, AccessRequestId, AccessStatus, ActivationId, ActivationStatus,
    DeliveryStatus, EmergencyActivation, Guardian, GuardianDecision, GuardianId,
    GuardianNotification, GuardianResponse, HealthCheck, NotificationId, ShieldSettings,
    ShieldStatus, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresShieldStorage {
    pool: PgPool,
}

impl PostgresShieldStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS shield_settings (
                user_id TEXT PRIMARY KEY,
                is_enabled BOOLEAN NOT NULL,
                inactivity_period_months INTEGER NOT NULL,
                required_guardians_for_activation INTEGER NOT NULL,
                shield_status TEXT NOT NULL,
                last_activity_check TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS guardians (
                guardian_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                contact_priority INTEGER NOT NULL,
                record JSONB NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS family_shield_activation_log (
                activation_id UUID PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                verification_token TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                record JSONB NOT NULL
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS family_shield_one_pending_per_user
                ON family_shield_activation_log (user_id)
                WHERE status = 'pending'
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS guardian_responses (
                activation_id UUID NOT NULL,
                guardian_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                notes TEXT,
                responded_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (activation_id, guardian_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS guardian_notifications (
                notification_id UUID PRIMARY KEY,
                guardian_id TEXT NOT NULL,
                activation_id UUID,
                delivery_status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                record JSONB NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_health_checks (
                check_seq BIGSERIAL PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                outcome TEXT NOT NULL,
                scheduled_at TIMESTAMPTZ NOT NULL,
                responded_at TIMESTAMPTZ
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS access_requests (
                request_id UUID PRIMARY KEY,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                record JSONB NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS emergency_access_audit (
                audit_seq BIGSERIAL PRIMARY KEY,
                entry_id UUID NOT NULL UNIQUE,
                request_id UUID,
                timestamp TIMESTAMPTZ NOT NULL,
                record JSONB NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn settings_exist(&self, user_id: &UserId) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM shield_settings WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl ShieldSettingsStore for PostgresShieldStorage {
    async fn get_settings(&self, user_id: &UserId) -> StorageResult<Option<ShieldSettings>> {
        let row = sqlx::query("SELECT * FROM shield_settings WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_settings).transpose()
    }

    async fn insert_settings_if_absent(&self, settings: ShieldSettings) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO shield_settings
                (user_id, is_enabled, inactivity_period_months, required_guardians_for_activation,
                 shield_status, last_activity_check, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(settings.user_id.as_str())
        .bind(settings.is_enabled)
        .bind(to_i32(settings.inactivity_period_months)?)
        .bind(to_i32(settings.required_guardians_for_activation)?)
        .bind(settings.shield_status.as_str())
        .bind(settings.last_activity_check)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_settings(&self, settings: ShieldSettings) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO shield_settings
                (user_id, is_enabled, inactivity_period_months, required_guardians_for_activation,
                 shield_status, last_activity_check, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE
               SET is_enabled = EXCLUDED.is_enabled,
                   inactivity_period_months = EXCLUDED.inactivity_period_months,
                   required_guardians_for_activation = EXCLUDED.required_guardians_for_activation,
                   shield_status = EXCLUDED.shield_status,
                   last_activity_check = EXCLUDED.last_activity_check,
                   updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(settings.user_id.as_str())
        .bind(settings.is_enabled)
        .bind(to_i32(settings.inactivity_period_months)?)
        .bind(to_i32(settings.required_guardians_for_activation)?)
        .bind(settings.shield_status.as_str())
        .bind(settings.last_activity_check)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn transition_shield_status(
        &self,
        user_id: &UserId,
        expected_from: ShieldStatus,
        to: ShieldStatus,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        if !expected_from.can_transition_to(to) {
            return Err(StorageError::InvariantViolation(format!(
                "shield status cannot move from {expected_from} to {to}"
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE shield_settings
               SET shield_status = $1,
                   updated_at = $2
             WHERE user_id = $3
               AND shield_status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(updated_at)
        .bind(user_id.as_str())
        .bind(expected_from.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            if self.settings_exist(user_id).await? {
                return Err(StorageError::InvariantViolation(format!(
                    "invalid shield transition for {user_id}: expected {expected_from}"
                )));
            }
            return Err(StorageError::NotFound(format!(
                "shield settings for {user_id}"
            )));
        }
        Ok(())
    }

    async fn touch_activity_check(
        &self,
        user_id: &UserId,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query("UPDATE shield_settings SET last_activity_check = $1 WHERE user_id = $2")
            .bind(at)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_enabled_settings(&self) -> StorageResult<Vec<ShieldSettings>> {
        let rows = sqlx::query("SELECT * FROM shield_settings WHERE is_enabled ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_settings).collect()
    }
}

#[async_trait]
impl GuardianStore for PostgresShieldStorage {
    async fn upsert_guardian(&self, guardian: Guardian) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO guardians (guardian_id, user_id, contact_priority, record)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (guardian_id) DO UPDATE
               SET user_id = EXCLUDED.user_id,
                   contact_priority = EXCLUDED.contact_priority,
                   record = EXCLUDED.record
            "#,
        )
        .bind(guardian.id.as_str())
        .bind(guardian.user_id.as_str())
        .bind(to_i32(guardian.priority())?)
        .bind(to_json(&guardian)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_guardian(&self, guardian_id: &GuardianId) -> StorageResult<Option<Guardian>> {
        let row = sqlx::query("SELECT record FROM guardians WHERE guardian_id = $1")
            .bind(guardian_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_guardians(&self, user_id: &UserId) -> StorageResult<Vec<Guardian>> {
        let rows = sqlx::query(
            "SELECT record FROM guardians WHERE user_id = $1 ORDER BY contact_priority, guardian_id",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl ActivationStore for PostgresShieldStorage {
    async fn create_activation(&self, activation: EmergencyActivation) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO family_shield_activation_log
                (activation_id, user_id, status, verification_token, created_at, updated_at, record)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*activation.id.as_uuid())
        .bind(activation.user_id.as_str())
        .bind(activation.status.as_str())
        .bind(activation.verification_token.as_str())
        .bind(activation.created_at)
        .bind(activation.updated_at)
        .bind(to_json(&activation)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_activation(
        &self,
        id: &ActivationId,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let row = sqlx::query(
            "SELECT record FROM family_shield_activation_log WHERE activation_id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_activation_by_token(
        &self,
        token: &str,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let row = sqlx::query(
            "SELECT record FROM family_shield_activation_log WHERE verification_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn pending_activation_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let row = sqlx::query(
            r#"
            SELECT record FROM family_shield_activation_log
             WHERE user_id = $1 AND status = 'pending'
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn latest_activation_for_user(
        &self,
        user_id: &UserId,
    ) -> StorageResult<Option<EmergencyActivation>> {
        let row = sqlx::query(
            r#"
            SELECT record FROM family_shield_activation_log
             WHERE user_id = $1
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn update_pending_activation(
        &self,
        activation: EmergencyActivation,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE family_shield_activation_log
               SET status = $1,
                   updated_at = $2,
                   record = $3
             WHERE activation_id = $4
               AND status = 'pending'
            "#,
        )
        .bind(activation.status.as_str())
        .bind(activation.updated_at)
        .bind(to_json(&activation)?)
        .bind(*activation.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            if self.get_activation(&activation.id).await?.is_some() {
                return Err(StorageError::InvariantViolation(format!(
                    "activation {} is no longer pending",
                    activation.id
                )));
            }
            return Err(StorageError::NotFound(format!("activation {}", activation.id)));
        }
        Ok(())
    }

    async fn list_activations_by_status(
        &self,
        status: ActivationStatus,
    ) -> StorageResult<Vec<EmergencyActivation>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM family_shield_activation_log
             WHERE status = $1
             ORDER BY created_at
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn record_response(&self, response: GuardianResponse) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO guardian_responses
                (activation_id, guardian_id, decision, notes, responded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*response.activation_id.as_uuid())
        .bind(response.guardian_id.as_str())
        .bind(response.decision.as_str())
        .bind(response.notes.as_deref())
        .bind(response.responded_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn list_responses(
        &self,
        activation_id: &ActivationId,
    ) -> StorageResult<Vec<GuardianResponse>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM guardian_responses
             WHERE activation_id = $1
             ORDER BY responded_at
            "#,
        )
        .bind(*activation_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_response).collect()
    }
}

#[async_trait]
impl NotificationStore for PostgresShieldStorage {
    async fn insert_notification(&self, notification: GuardianNotification) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO guardian_notifications
                (notification_id, guardian_id, activation_id, delivery_status, created_at, record)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*notification.id.as_uuid())
        .bind(notification.guardian_id.as_str())
        .bind(notification.activation_id.map(|id| *id.as_uuid()))
        .bind(notification.delivery_status.as_str())
        .bind(notification.created_at)
        .bind(to_json(&notification)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn list_notifications_for_activation(
        &self,
        activation_id: &ActivationId,
    ) -> StorageResult<Vec<GuardianNotification>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM guardian_notifications
             WHERE activation_id = $1
             ORDER BY created_at
            "#,
        )
        .bind(*activation_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_record).collect()
    }

    async fn mark_notification_read(
        &self,
        id: &NotificationId,
        guardian_id: &GuardianId,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(
            r#"
            SELECT record FROM guardian_notifications
             WHERE notification_id = $1 AND guardian_id = $2
             FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .bind(guardian_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StorageError::NotFound(format!("{id} for {guardian_id}")))?;

        let mut notification: GuardianNotification = row_to_record(&row)?;
        notification.read_at = Some(at);

        sqlx::query("UPDATE guardian_notifications SET record = $1 WHERE notification_id = $2")
            .bind(to_json(&notification)?)
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn count_notifications(&self, status: DeliveryStatus) -> StorageResult<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM guardian_notifications WHERE delivery_status = $1",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl HealthCheckStore for PostgresShieldStorage {
    async fn append_health_check(&self, check: HealthCheck) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_health_checks (user_id, kind, outcome, scheduled_at, responded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(check.user_id.as_str())
        .bind(check.kind.as_str())
        .bind(check.outcome.as_str())
        .bind(check.scheduled_at)
        .bind(check.responded_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn recent_health_checks(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> StorageResult<Vec<HealthCheck>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM user_health_checks
             WHERE user_id = $1
             ORDER BY scheduled_at DESC, check_seq DESC
             LIMIT $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_health_check).collect()
    }
}

#[async_trait]
impl AccessRequestStore for PostgresShieldStorage {
    async fn insert_access_request(&self, request: AccessRequest) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_requests (request_id, status, created_at, record)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(*request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.created_at)
        .bind(to_json(&request)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn get_access_request(
        &self,
        id: &AccessRequestId,
    ) -> StorageResult<Option<AccessRequest>> {
        let row = sqlx::query("SELECT record FROM access_requests WHERE request_id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn update_access_request(
        &self,
        request: AccessRequest,
        expected_from: AccessStatus,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE access_requests
               SET status = $1,
                   record = $2
             WHERE request_id = $3
               AND status = $4
            "#,
        )
        .bind(request.status.as_str())
        .bind(to_json(&request)?)
        .bind(*request.id.as_uuid())
        .bind(expected_from.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            if self.get_access_request(&request.id).await?.is_some() {
                return Err(StorageError::InvariantViolation(format!(
                    "invalid access transition for {}: expected {expected_from}",
                    request.id
                )));
            }
            return Err(StorageError::NotFound(format!("access request {}", request.id)));
        }
        Ok(())
    }

    async fn list_access_requests(
        &self,
        status: Option<AccessStatus>,
    ) -> StorageResult<Vec<AccessRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM access_requests
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY created_at
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl AccessAuditStore for PostgresShieldStorage {
    async fn append_access_log(&self, entry: AccessLogEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO emergency_access_audit (entry_id, request_id, timestamp, record)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(entry.id)
        .bind(entry.request_id.map(|id| *id.as_uuid()))
        .bind(entry.timestamp)
        .bind(to_json(&entry)?)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_conflict)?;
        Ok(())
    }

    async fn list_access_logs(
        &self,
        request_id: Option<&AccessRequestId>,
    ) -> StorageResult<Vec<AccessLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM emergency_access_audit
             WHERE ($1::UUID IS NULL OR request_id = $1)
             ORDER BY audit_seq
            "#,
        )
        .bind(request_id.map(|id| *id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_settings(row: &PgRow) -> StorageResult<ShieldSettings> {
    let status: String = column(row, "shield_status")?;
    Ok(ShieldSettings {
        user_id: UserId::new(column::<String>(row, "user_id")?),
        is_enabled: column(row, "is_enabled")?,
        inactivity_period_months: from_i32(column(row, "inactivity_period_months")?),
        required_guardians_for_activation: from_i32(column(
            row,
            "required_guardians_for_activation",
        )?),
        shield_status: parse_tag(&status)?,
        last_activity_check: column(row, "last_activity_check")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn row_to_response(row: &PgRow) -> StorageResult<GuardianResponse> {
    let decision: String = column(row, "decision")?;
    Ok(GuardianResponse {
        activation_id: ActivationId::from_uuid(column::<Uuid>(row, "activation_id")?),
        guardian_id: GuardianId::new(column::<String>(row, "guardian_id")?),
        decision: parse_tag::<GuardianDecision>(&decision)?,
        notes: column(row, "notes")?,
        responded_at: column(row, "responded_at")?,
    })
}

fn row_to_health_check(row: &PgRow) -> StorageResult<HealthCheck> {
    let kind: String = column(row, "kind")?;
    let outcome: String = column(row, "outcome")?;
    Ok(HealthCheck {
        user_id: UserId::new(column::<String>(row, "user_id")?),
        kind: parse_tag(&kind)?,
        outcome: parse_tag(&outcome)?,
        scheduled_at: column(row, "scheduled_at")?,
        responded_at: column(row, "responded_at")?,
    })
}

fn row_to_record<T: DeserializeOwned>(row: &PgRow) -> StorageResult<T> {
    let value: serde_json::Value = column(row, "record")?;
    serde_json::from_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StorageError::Backend(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> StorageResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_tag<T>(value: &str) -> StorageResult<T>
where
    T: std::str::FromStr<Err = shield_types::ParseTagError>,
{
    value
        .parse()
        .map_err(|e: shield_types::ParseTagError| StorageError::Serialization(e.to_string()))
}

fn to_i32(value: u32) -> StorageResult<i32> {
    i32::try_from(value).map_err(|_| StorageError::InvalidInput(format!("{value} out of range")))
}

fn from_i32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(err.to_string())
        }
        other => StorageError::Backend(other.to_string()),
    }
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    map_sqlx_error(err)
}
