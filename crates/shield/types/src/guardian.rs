//! Guardians and their permission flags.

use serde::{Deserialize, Serialize};

use crate::{GuardianId, UserId};

/// Permission flags carried by a guardian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GuardianPermissions {
    pub can_trigger_emergency: bool,
    pub can_access_health_docs: bool,
    pub can_access_financial_docs: bool,
    pub is_child_guardian: bool,
    pub is_will_executor: bool,
    /// Lower is contacted first.
    pub emergency_contact_priority: u32,
}

/// A row of `guardians`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: GuardianId,
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub push_token: Option<String>,
    pub permissions: GuardianPermissions,
    pub is_active: bool,
}

impl Guardian {
    /// Whether this guardian may be asked to confirm an emergency.
    pub fn can_trigger(&self) -> bool {
        self.is_active && self.permissions.can_trigger_emergency
    }

    pub fn priority(&self) -> u32 {
        self.permissions.emergency_contact_priority
    }
}
