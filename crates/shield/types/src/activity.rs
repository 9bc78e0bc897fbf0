//! Activity and health-check types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Derived health classification of a user's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unresponsive,
}

string_tags!(HealthStatus, "health status", {
    Healthy => "healthy",
    Warning => "warning",
    Critical => "critical",
    Unresponsive => "unresponsive",
});

/// Point-in-time view of how recently a user has been active.
///
/// Recomputed on demand and never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub user_id: UserId,
    pub last_login: Option<DateTime<Utc>>,
    pub last_document_access: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Latest of every available signal. `None` when no source reported
    /// anything, in which case the derived inactivity fields are `None` too.
    pub last_api_activity: Option<DateTime<Utc>>,
    /// 0-100, decays linearly against the inactivity threshold.
    pub activity_score: Option<f64>,
    pub inactivity_days: Option<i64>,
    pub inactivity_threshold_days: i64,
    pub health_check_status: Option<HealthStatus>,
    /// Unbroken streak of missed checks, most recent first.
    pub consecutive_missed_checks: u32,
    pub computed_at: DateTime<Utc>,
}

/// How a scheduled health check was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckKind {
    ApiPing,
    DocumentAccess,
    Login,
    ManualConfirmation,
}

string_tags!(HealthCheckKind, "health check kind", {
    ApiPing => "api_ping",
    DocumentAccess => "document_access",
    Login => "login",
    ManualConfirmation => "manual_confirmation",
});

/// Result of a scheduled health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckOutcome {
    Responded,
    Missed,
    Pending,
}

string_tags!(HealthCheckOutcome, "health check outcome", {
    Responded => "responded",
    Missed => "missed",
    Pending => "pending",
});

/// A row of `user_health_checks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub user_id: UserId,
    pub kind: HealthCheckKind,
    pub outcome: HealthCheckOutcome,
    pub scheduled_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl HealthCheck {
    pub fn is_missed(&self) -> bool {
        self.outcome == HealthCheckOutcome::Missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_orders_by_severity() {
        assert!(HealthStatus::Healthy < HealthStatus::Warning);
        assert!(HealthStatus::Critical < HealthStatus::Unresponsive);
    }

    #[test]
    fn tags_round_trip_through_from_str() {
        assert_eq!("api_ping".parse::<HealthCheckKind>(), Ok(HealthCheckKind::ApiPing));
        assert_eq!(HealthCheckOutcome::Missed.as_str(), "missed");
        assert!("sleeping".parse::<HealthCheckOutcome>().is_err());
    }
}
