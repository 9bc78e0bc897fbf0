//! Guardian access requests and the access audit log.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AccessRequestId, GuardianId, UserId};

/// How urgent a guardian says their request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

string_tags!(Urgency, "urgency", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

/// Category of protected resource a grant may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessScope {
    Documents,
    Medical,
    Financial,
    Insurance,
    Legal,
    Contacts,
    TimeCapsules,
    Guidance,
    /// Satisfies every scope check.
    All,
}

string_tags!(AccessScope, "access scope", {
    Documents => "documents",
    Medical => "medical",
    Financial => "financial",
    Insurance => "insurance",
    Legal => "legal",
    Contacts => "contacts",
    TimeCapsules => "time_capsules",
    Guidance => "guidance",
    All => "all",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Pending,
    Approved,
    Denied,
    Revoked,
}

string_tags!(AccessStatus, "access status", {
    Pending => "pending",
    Approved => "approved",
    Denied => "denied",
    Revoked => "revoked",
});

impl AccessStatus {
    /// `pending -> approved | denied | revoked`, `approved -> revoked`.
    /// Revoking an already revoked request is accepted as a no-op.
    pub fn can_transition_to(&self, to: AccessStatus) -> bool {
        use AccessStatus::*;
        matches!(
            (self, to),
            (Pending, Approved) | (Pending, Denied) | (Pending, Revoked) | (Approved, Revoked)
                | (Revoked, Revoked)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AccessStatus::Denied | AccessStatus::Revoked)
    }
}

/// A guardian's request for scoped access to a user's resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: AccessRequestId,
    pub user_id: UserId,
    pub guardian_id: GuardianId,
    pub reason: String,
    pub urgency: Urgency,
    pub requested_access: BTreeSet<AccessScope>,
    pub status: AccessStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    /// TTL in milliseconds counted from approval.
    pub duration_ms: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    /// Whether the requested scopes cover `scope`.
    pub fn covers(&self, scope: AccessScope) -> bool {
        self.requested_access.contains(&AccessScope::All) || self.requested_access.contains(&scope)
    }

    /// Approved and not past its expiry at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AccessStatus::Approved && self.expires_at.map(|at| now < at).unwrap_or(true)
    }

    /// Expiry for an approval stamped at `approved_at`.
    ///
    /// A TTL that lands past the last representable instant never expires.
    pub fn expiry_from(&self, approved_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let ms = i64::try_from(self.duration_ms?).ok()?;
        approved_at.checked_add_signed(Duration::try_milliseconds(ms)?)
    }
}

/// Who is asking to read a protected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorType {
    Guardian,
    Survivor,
}

string_tags!(AccessorType, "accessor type", {
    Guardian => "guardian",
    Survivor => "survivor",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    View,
    Download,
    Edit,
    Delete,
    Share,
}

string_tags!(AccessAction, "access action", {
    View => "view",
    Download => "download",
    Edit => "edit",
    Delete => "delete",
    Share => "share",
});

impl AccessAction {
    pub fn is_read_only(&self) -> bool {
        matches!(self, AccessAction::View | AccessAction::Download)
    }
}

/// Append-only audit record of an access decision (`emergency_access_audit`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub request_id: Option<AccessRequestId>,
    pub user_id: Option<UserId>,
    pub accessor_type: Option<AccessorType>,
    pub accessor_id: Option<String>,
    pub resource: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub success: bool,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(scopes: &[AccessScope]) -> AccessRequest {
        let now = Utc::now();
        AccessRequest {
            id: AccessRequestId::generate(),
            user_id: UserId::new("u"),
            guardian_id: GuardianId::new("g"),
            reason: "r".to_string(),
            urgency: Urgency::High,
            requested_access: scopes.iter().copied().collect(),
            status: AccessStatus::Pending,
            created_at: now,
            updated_at: now,
            approved_at: None,
            duration_ms: Some(3_600_000),
            expires_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn all_scope_covers_everything() {
        let r = request(&[AccessScope::All]);
        assert!(r.covers(AccessScope::Financial));
        assert!(r.covers(AccessScope::Medical));
    }

    #[test]
    fn named_scope_covers_only_itself() {
        let r = request(&[AccessScope::Medical]);
        assert!(r.covers(AccessScope::Medical));
        assert!(!r.covers(AccessScope::Financial));
    }

    #[test]
    fn expiry_is_duration_after_approval() {
        let r = request(&[AccessScope::Documents]);
        let approved = Utc::now();
        assert_eq!(r.expiry_from(approved), Some(approved + Duration::hours(1)));
    }

    #[test]
    fn unrepresentable_ttl_never_expires() {
        let approved = Utc::now();
        let mut r = request(&[AccessScope::Documents]);
        r.duration_ms = Some(u64::MAX);
        assert_eq!(r.expiry_from(approved), None);
        r.duration_ms = Some(i64::MAX as u64);
        assert_eq!(r.expiry_from(approved), None);
    }

    #[test]
    fn no_transition_back_to_pending() {
        use AccessStatus::*;
        for from in [Pending, Approved, Denied, Revoked] {
            assert!(!from.can_transition_to(Pending));
        }
        assert!(!Denied.can_transition_to(Approved));
        assert!(!Revoked.can_transition_to(Approved));
    }
}
