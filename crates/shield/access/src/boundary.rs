//! Resource-access boundary.
//!
//! Every read of a protected resource made on behalf of a guardian or a
//! survivor goes through [`AccessControl::validate_access`], which decides
//! and writes exactly one audit entry per call.

use serde::{Deserialize, Serialize};
use shield_storage::{AccessAuditStore, AccessRequestStore, ShieldSettingsStore};
use shield_types::{
    AccessAction, AccessLogEntry, AccessRequestId, AccessScope, AccessorType, Clock, GuardianId,
    GuardianPermissions, ShieldStatus, UserId,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::control::AccessControl;
use crate::error::{AccessError, AccessResult};

/// Scopes a survivor may read once the shield is active.
pub const SURVIVOR_SCOPES: [AccessScope; 4] = [
    AccessScope::Documents,
    AccessScope::Contacts,
    AccessScope::TimeCapsules,
    AccessScope::Guidance,
];

/// Who is asking, and on what authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    pub accessor_type: AccessorType,
    pub accessor_id: String,
    /// Required for guardian accessors.
    pub request_id: Option<AccessRequestId>,
    #[serde(default)]
    pub permissions: GuardianPermissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: String,
    /// Id of the audit entry written for this decision.
    pub log_id: Uuid,
}

impl AccessControl {
    /// Decide whether `context` may perform `action` on a resource of the
    /// given scope belonging to `user_id`.
    ///
    /// A denial is a normal `Ok` result. Storage failures are returned as
    /// errors after a failed attempt has been audited.
    #[instrument(
        skip(self, resource_id, context),
        fields(user_id = %user_id, accessor_type = %context.accessor_type)
    )]
    pub async fn validate_access(
        &self,
        user_id: &UserId,
        resource: AccessScope,
        resource_id: &str,
        action: AccessAction,
        context: &AccessContext,
    ) -> AccessResult<AccessDecision> {
        let verdict = self.decide(user_id, resource, action, context).await;

        let (granted, reason) = match &verdict {
            Ok(Verdict::Grant) => (true, "access granted".to_string()),
            Ok(Verdict::Deny(reason)) => (false, reason.clone()),
            Err(_) => (false, "internal error".to_string()),
        };

        let entry = AccessLogEntry {
            id: Uuid::new_v4(),
            request_id: context.request_id,
            user_id: Some(user_id.clone()),
            accessor_type: Some(context.accessor_type),
            accessor_id: Some(context.accessor_id.clone()),
            resource: resource.to_string(),
            resource_id: Some(resource_id.to_string()),
            action: action.to_string(),
            success: granted,
            reason: Some(reason.clone()),
            timestamp: self.clock.now(),
        };
        let log_id = entry.id;
        let logged = self.storage.append_access_log(entry).await;

        if let Err(err) = verdict {
            if let Err(log_err) = logged {
                warn!(error = %log_err, "failed to audit errored access check");
            }
            return Err(err);
        }
        logged?;

        if !granted {
            warn!(resource = %resource, action = %action, reason = %reason, "access denied");
        }
        Ok(AccessDecision {
            granted,
            reason,
            log_id,
        })
    }

    async fn decide(
        &self,
        user_id: &UserId,
        resource: AccessScope,
        action: AccessAction,
        context: &AccessContext,
    ) -> AccessResult<Verdict> {
        let active = self
            .storage
            .get_settings(user_id)
            .await?
            .map(|s| s.shield_status == ShieldStatus::Active)
            .unwrap_or(false);
        if !active {
            return Ok(Verdict::Deny("shield is not active".to_string()));
        }

        match context.accessor_type {
            AccessorType::Guardian => self.decide_guardian(user_id, resource, context).await,
            AccessorType::Survivor => Ok(decide_survivor(resource, action)),
        }
    }

    async fn decide_guardian(
        &self,
        user_id: &UserId,
        resource: AccessScope,
        context: &AccessContext,
    ) -> AccessResult<Verdict> {
        let Some(request_id) = context.request_id else {
            return Ok(Verdict::Deny("no access request presented".to_string()));
        };
        let request = match self.storage.get_access_request(&request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(Verdict::Deny("unknown access request".to_string())),
            Err(err) => return Err(AccessError::Storage(err)),
        };

        if &request.user_id != user_id
            || request.guardian_id != GuardianId::new(context.accessor_id.as_str())
        {
            return Ok(Verdict::Deny(
                "access request belongs to another user or guardian".to_string(),
            ));
        }
        if !request.is_valid_at(self.clock.now()) {
            return Ok(Verdict::Deny(format!(
                "access request is {} or expired",
                request.status
            )));
        }
        if !request.covers(resource) {
            return Ok(Verdict::Deny(format!("{resource} is not in the granted scopes")));
        }
        if let Some(flag) = missing_permission(resource, &context.permissions) {
            return Ok(Verdict::Deny(format!("guardian lacks {flag}")));
        }

        Ok(Verdict::Grant)
    }
}

enum Verdict {
    Grant,
    Deny(String),
}

fn decide_survivor(resource: AccessScope, action: AccessAction) -> Verdict {
    if !action.is_read_only() {
        return Verdict::Deny(format!("survivors may not {action}"));
    }
    if !SURVIVOR_SCOPES.contains(&resource) {
        return Verdict::Deny(format!("survivors may not read {resource}"));
    }
    Verdict::Grant
}

fn missing_permission(resource: AccessScope, perms: &GuardianPermissions) -> Option<&'static str> {
    let health = matches!(resource, AccessScope::Medical | AccessScope::All);
    let financial = matches!(resource, AccessScope::Financial | AccessScope::All);
    if health && !perms.can_access_health_docs {
        Some("can_access_health_docs")
    } else if financial && !perms.can_access_financial_docs {
        Some("can_access_financial_docs")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use shield_storage::memory::InMemoryShieldStorage;
    use shield_types::{AccessStatus, ManualClock, ShieldSettings, Urgency};

    use crate::control::CreateAccessRequest;

    struct Fixture {
        storage: Arc<InMemoryShieldStorage>,
        clock: Arc<ManualClock>,
        control: AccessControl,
    }

    async fn fixture(status: ShieldStatus) -> Fixture {
        let storage = Arc::new(InMemoryShieldStorage::new());
        let clock = Arc::new(ManualClock::default());
        let mut settings = ShieldSettings::new_default(UserId::new("u1"), clock.now());
        settings.is_enabled = true;
        settings.shield_status = status;
        storage.upsert_settings(settings).await.unwrap();
        let control = AccessControl::new(storage.clone(), clock.clone());
        Fixture {
            storage,
            clock,
            control,
        }
    }

    async fn approved(f: &Fixture, scopes: &[AccessScope], ttl_ms: Option<u64>) -> AccessRequestId {
        let request = f
            .control
            .create_access_request(CreateAccessRequest {
                user_id: UserId::new("u1"),
                guardian_id: GuardianId::new("g1"),
                reason: "incapacitated".to_string(),
                urgency: Urgency::Critical,
                requested_access: scopes.iter().copied().collect(),
                duration_ms: ttl_ms,
            })
            .await
            .unwrap();
        f.control
            .update_request_status(&request.id, AccessStatus::Approved)
            .await
            .unwrap();
        request.id
    }

    fn guardian(request_id: AccessRequestId, permissions: GuardianPermissions) -> AccessContext {
        AccessContext {
            accessor_type: AccessorType::Guardian,
            accessor_id: "g1".to_string(),
            request_id: Some(request_id),
            permissions,
        }
    }

    fn survivor() -> AccessContext {
        AccessContext {
            accessor_type: AccessorType::Survivor,
            accessor_id: "s1".to_string(),
            request_id: None,
            permissions: GuardianPermissions::default(),
        }
    }

    async fn check(
        f: &Fixture,
        scope: AccessScope,
        action: AccessAction,
        ctx: &AccessContext,
    ) -> AccessDecision {
        f.control
            .validate_access(&UserId::new("u1"), scope, "doc-1", action, ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn inactive_shield_denies_everyone() {
        let f = fixture(ShieldStatus::PendingVerification).await;
        let id = approved(&f, &[AccessScope::Documents], None).await;

        let ctx = guardian(id, GuardianPermissions::default());
        let g = check(&f, AccessScope::Documents, AccessAction::View, &ctx).await;
        let s = check(&f, AccessScope::Documents, AccessAction::View, &survivor()).await;
        assert!(!g.granted);
        assert!(!s.granted);
        assert_eq!(f.control.get_access_logs(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn guardian_with_valid_grant_is_allowed_and_audited() {
        let f = fixture(ShieldStatus::Active).await;
        let id = approved(&f, &[AccessScope::Documents], Some(60_000)).await;

        let ctx = guardian(id, GuardianPermissions::default());
        let decision = check(&f, AccessScope::Documents, AccessAction::View, &ctx).await;
        assert!(decision.granted);

        let logs = f.control.get_access_logs(Some(&id)).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, decision.log_id);
        assert!(logs[0].success);
        assert_eq!(logs[0].resource_id.as_deref(), Some("doc-1"));

        f.clock.advance(Duration::seconds(60));
        let late = check(&f, AccessScope::Documents, AccessAction::View, &ctx).await;
        assert!(!late.granted);
    }

    #[tokio::test]
    async fn medical_and_financial_need_flags() {
        let f = fixture(ShieldStatus::Active).await;
        let id = approved(&f, &[AccessScope::All], None).await;

        let none = guardian(id, GuardianPermissions::default());
        let health_only = guardian(
            id,
            GuardianPermissions {
                can_access_health_docs: true,
                ..GuardianPermissions::default()
            },
        );
        let both = guardian(
            id,
            GuardianPermissions {
                can_access_health_docs: true,
                can_access_financial_docs: true,
                ..GuardianPermissions::default()
            },
        );

        let view = AccessAction::View;
        assert!(!check(&f, AccessScope::Medical, view, &none).await.granted);
        assert!(check(&f, AccessScope::Medical, view, &health_only).await.granted);
        assert!(!check(&f, AccessScope::Financial, view, &health_only).await.granted);
        assert!(check(&f, AccessScope::Financial, view, &both).await.granted);
        assert!(check(&f, AccessScope::Legal, view, &none).await.granted);
    }

    #[tokio::test]
    async fn guardian_cannot_use_someone_elses_request() {
        let f = fixture(ShieldStatus::Active).await;
        let id = approved(&f, &[AccessScope::Documents], None).await;

        let mut ctx = guardian(id, GuardianPermissions::default());
        ctx.accessor_id = "g2".to_string();
        assert!(!check(&f, AccessScope::Documents, AccessAction::View, &ctx).await.granted);

        ctx.request_id = None;
        assert!(!check(&f, AccessScope::Documents, AccessAction::View, &ctx).await.granted);
    }

    #[tokio::test]
    async fn revoked_grant_is_denied() {
        let f = fixture(ShieldStatus::Active).await;
        let id = approved(&f, &[AccessScope::Documents], None).await;
        f.control.revoke_access(&id).await.unwrap();

        let ctx = guardian(id, GuardianPermissions::default());
        assert!(!check(&f, AccessScope::Documents, AccessAction::View, &ctx).await.granted);
    }

    #[tokio::test]
    async fn survivors_get_read_only_access_to_listed_scopes() {
        let f = fixture(ShieldStatus::Active).await;
        let ctx = survivor();

        assert!(check(&f, AccessScope::Documents, AccessAction::View, &ctx).await.granted);
        assert!(check(&f, AccessScope::TimeCapsules, AccessAction::Download, &ctx).await.granted);
        assert!(!check(&f, AccessScope::Documents, AccessAction::Edit, &ctx).await.granted);
        assert!(!check(&f, AccessScope::Financial, AccessAction::View, &ctx).await.granted);
        assert_eq!(f.control.get_access_logs(None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn storage_outage_is_an_error() {
        let f = fixture(ShieldStatus::Active).await;
        f.storage.set_offline(true);
        let result = f
            .control
            .validate_access(
                &UserId::new("u1"),
                AccessScope::Documents,
                "doc-1",
                AccessAction::View,
                &survivor(),
            )
            .await;
        assert!(matches!(result, Err(AccessError::Storage(_))));
    }
}
