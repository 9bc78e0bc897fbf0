//! Per-user shield settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Days counted per configured month of inactivity.
pub const DAYS_PER_MONTH: i64 = 30;

/// Current state of a user's shield.
///
/// Moves forward only (`Inactive -> PendingVerification -> Active`); the one
/// way back is an explicit reset to `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldStatus {
    Inactive,
    PendingVerification,
    Active,
}

string_tags!(ShieldStatus, "shield status", {
    Inactive => "inactive",
    PendingVerification => "pending_verification",
    Active => "active",
});

impl ShieldStatus {
    fn rank(&self) -> u8 {
        match self {
            ShieldStatus::Inactive => 0,
            ShieldStatus::PendingVerification => 1,
            ShieldStatus::Active => 2,
        }
    }

    /// Whether moving from `self` to `to` is allowed.
    pub fn can_transition_to(&self, to: ShieldStatus) -> bool {
        to == ShieldStatus::Inactive || to.rank() >= self.rank()
    }
}

/// A row of `shield_settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldSettings {
    pub user_id: UserId,
    pub is_enabled: bool,
    pub inactivity_period_months: u32,
    pub required_guardians_for_activation: u32,
    pub shield_status: ShieldStatus,
    pub last_activity_check: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ShieldSettings {
    /// Defaults for a newly initialised user: six months, one guardian,
    /// disabled until the user opts in.
    pub fn new_default(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            is_enabled: false,
            inactivity_period_months: 6,
            required_guardians_for_activation: 1,
            shield_status: ShieldStatus::Inactive,
            last_activity_check: None,
            updated_at: now,
        }
    }

    pub fn inactivity_threshold_days(&self) -> i64 {
        i64::from(self.inactivity_period_months) * DAYS_PER_MONTH
    }

    /// Quorum size, never below one.
    pub fn quorum(&self) -> u32 {
        self.required_guardians_for_activation.max(1)
    }
}
