//! Access request lifecycle.
//!
//! Requests are loaded from the store on every call; nothing is cached, so
//! validity is always judged against the clock at the instant of the call.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shield_storage::{AccessAuditStore, AccessRequestStore, ShieldStorage};
use shield_types::{
    AccessLogEntry, AccessRequest, AccessRequestId, AccessScope, AccessStatus, Clock, GuardianId,
    Urgency, UserId,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{AccessError, AccessResult};

/// Parameters for a new access request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccessRequest {
    pub user_id: UserId,
    pub guardian_id: GuardianId,
    pub reason: String,
    pub urgency: Urgency,
    pub requested_access: BTreeSet<AccessScope>,
    /// Grant lifetime in milliseconds, counted from approval.
    pub duration_ms: Option<u64>,
}

/// Manages guardian access requests and the access audit trail.
pub struct AccessControl {
    pub(crate) storage: Arc<dyn ShieldStorage>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl AccessControl {
    pub fn new(storage: Arc<dyn ShieldStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Create a pending request.
    #[instrument(skip(self, params), fields(guardian_id = %params.guardian_id))]
    pub async fn create_access_request(
        &self,
        params: CreateAccessRequest,
    ) -> AccessResult<AccessRequest> {
        if params.guardian_id.is_empty() {
            return Err(AccessError::InvalidParameters(
                "guardian_id must not be empty".to_string(),
            ));
        }
        if params.reason.trim().is_empty() {
            return Err(AccessError::InvalidParameters(
                "reason must not be empty".to_string(),
            ));
        }
        if params.requested_access.is_empty() {
            return Err(AccessError::InvalidParameters(
                "requested_access must name at least one scope".to_string(),
            ));
        }

        let now = self.clock.now();
        let request = AccessRequest {
            id: AccessRequestId::generate(),
            user_id: params.user_id,
            guardian_id: params.guardian_id,
            reason: params.reason,
            urgency: params.urgency,
            requested_access: params.requested_access,
            status: AccessStatus::Pending,
            created_at: now,
            updated_at: now,
            approved_at: None,
            duration_ms: params.duration_ms,
            expires_at: None,
            revoked_at: None,
        };
        self.storage.insert_access_request(request.clone()).await?;

        info!(request_id = %request.id, urgency = %request.urgency, "access request created");
        Ok(request)
    }

    /// Approve or deny a pending request.
    ///
    /// Approval stamps `approved_at` and derives `expires_at` from the
    /// requested duration.
    #[instrument(skip(self))]
    pub async fn update_request_status(
        &self,
        id: &AccessRequestId,
        status: AccessStatus,
    ) -> AccessResult<AccessRequest> {
        let mut request = self.load(id).await?;
        let from = request.status;

        let allowed = from == AccessStatus::Pending
            && matches!(status, AccessStatus::Approved | AccessStatus::Denied);
        if !allowed {
            return Err(AccessError::InvalidTransition { from, to: status });
        }

        let now = self.clock.now();
        request.status = status;
        request.updated_at = now;
        if status == AccessStatus::Approved {
            request.approved_at = Some(now);
            request.expires_at = request.expiry_from(now);
        }
        self.storage
            .update_access_request(request.clone(), from)
            .await?;

        info!(request_id = %id, status = %status, "access request updated");
        Ok(request)
    }

    /// Whether the grant is usable right now.
    ///
    /// Unknown requests are not valid.
    pub async fn is_access_valid(&self, id: &AccessRequestId) -> AccessResult<bool> {
        let now = self.clock.now();
        Ok(self
            .storage
            .get_access_request(id)
            .await?
            .map(|r| r.is_valid_at(now))
            .unwrap_or(false))
    }

    /// Revoke a request. Revoking an already revoked request is a no-op.
    #[instrument(skip(self))]
    pub async fn revoke_access(&self, id: &AccessRequestId) -> AccessResult<AccessRequest> {
        let mut request = self.load(id).await?;
        let from = request.status;

        if from == AccessStatus::Revoked {
            return Ok(request);
        }
        if !from.can_transition_to(AccessStatus::Revoked) {
            return Err(AccessError::InvalidTransition {
                from,
                to: AccessStatus::Revoked,
            });
        }

        let now = self.clock.now();
        request.status = AccessStatus::Revoked;
        request.revoked_at = Some(now);
        request.updated_at = now;
        self.storage
            .update_access_request(request.clone(), from)
            .await?;

        info!(request_id = %id, "access revoked");
        Ok(request)
    }

    /// Approved, still valid, and covering `scope`.
    pub async fn has_permission(
        &self,
        id: &AccessRequestId,
        scope: AccessScope,
    ) -> AccessResult<bool> {
        let now = self.clock.now();
        Ok(self
            .storage
            .get_access_request(id)
            .await?
            .map(|r| r.is_valid_at(now) && r.covers(scope))
            .unwrap_or(false))
    }

    /// Append an audit entry for an access decision made against `id`.
    pub async fn log_access_attempt(
        &self,
        id: &AccessRequestId,
        resource: &str,
        action: &str,
        success: bool,
    ) -> AccessResult<AccessLogEntry> {
        let entry = AccessLogEntry {
            id: Uuid::new_v4(),
            request_id: Some(*id),
            user_id: None,
            accessor_type: None,
            accessor_id: None,
            resource: resource.to_string(),
            resource_id: None,
            action: action.to_string(),
            success,
            reason: None,
            timestamp: self.clock.now(),
        };
        self.storage.append_access_log(entry.clone()).await?;
        Ok(entry)
    }

    pub async fn get_pending_requests(&self) -> AccessResult<Vec<AccessRequest>> {
        Ok(self
            .storage
            .list_access_requests(Some(AccessStatus::Pending))
            .await?)
    }

    pub async fn get_approved_requests(&self) -> AccessResult<Vec<AccessRequest>> {
        Ok(self
            .storage
            .list_access_requests(Some(AccessStatus::Approved))
            .await?)
    }

    pub async fn get_request(&self, id: &AccessRequestId) -> AccessResult<Option<AccessRequest>> {
        Ok(self.storage.get_access_request(id).await?)
    }

    /// Audit entries, oldest first. `None` returns the whole trail.
    pub async fn get_access_logs(
        &self,
        request_id: Option<&AccessRequestId>,
    ) -> AccessResult<Vec<AccessLogEntry>> {
        Ok(self.storage.list_access_logs(request_id).await?)
    }

    async fn load(&self, id: &AccessRequestId) -> AccessResult<AccessRequest> {
        self.storage
            .get_access_request(id)
            .await?
            .ok_or(AccessError::NotFound(*id))
    }
}
