//! Activity tracker.
//!
//! Reads the latest timestamp from every configured source, the user's
//! shield settings and recent health checks, and derives an
//! [`ActivitySnapshot`]. Nothing is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shield_storage::{HealthCheckStore, ShieldSettingsStore, ShieldStorage};
use shield_types::{ActivitySnapshot, Clock, HealthCheck, HealthStatus, ShieldSettings, UserId};
use tracing::{debug, instrument, warn};

use crate::error::ActivityResult;
use crate::signals::{ActivitySource, SignalKind};

/// Threshold used when the user has no settings row yet (six months).
pub const DEFAULT_THRESHOLD_DAYS: i64 = 180;

/// How many recent health checks are inspected for the missed streak.
pub const HEALTH_CHECK_WINDOW: usize = 30;

/// Computes activity snapshots on demand.
pub struct ActivityTracker {
    storage: Arc<dyn ShieldStorage>,
    sources: Vec<Arc<dyn ActivitySource>>,
    clock: Arc<dyn Clock>,
}

impl ActivityTracker {
    pub fn new(storage: Arc<dyn ShieldStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            sources: Vec::new(),
            clock,
        }
    }

    /// Add a signal source.
    pub fn with_source(mut self, source: Arc<dyn ActivitySource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Compute the activity snapshot for `user_id`.
    ///
    /// A source that fails is skipped; the snapshot is built from whatever
    /// the remaining sources report. With no signal at all the inactivity
    /// fields stay empty but the health-check streak is still computed.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn compute_activity(&self, user_id: &UserId) -> ActivityResult<ActivitySnapshot> {
        let now = self.clock.now();

        let mut last_login = None;
        let mut last_document_access = None;
        let mut last_seen = None;

        for source in &self.sources {
            let kind = source.kind();
            let latest = match source.latest(user_id).await {
                Ok(latest) => latest,
                Err(err) => {
                    warn!(source = kind.as_str(), error = %err, "activity source failed, skipping");
                    continue;
                }
            };
            let slot = match kind {
                SignalKind::Login => &mut last_login,
                SignalKind::DocumentAccess => &mut last_document_access,
                SignalKind::LastSeen => &mut last_seen,
            };
            *slot = latest_of(*slot, latest);
        }

        let last_api_activity = [last_login, last_document_access, last_seen]
            .into_iter()
            .flatten()
            .max();
        if last_api_activity.is_none() {
            debug!("no activity signals, inactivity left undetermined");
        }

        let threshold_days = self
            .storage
            .get_settings(user_id)
            .await?
            .as_ref()
            .map(ShieldSettings::inactivity_threshold_days)
            .unwrap_or(DEFAULT_THRESHOLD_DAYS);

        let checks = self
            .storage
            .recent_health_checks(user_id, HEALTH_CHECK_WINDOW)
            .await?;

        let inactivity = last_api_activity.map(|last| inactivity_days(now, last));
        let snapshot = ActivitySnapshot {
            user_id: user_id.clone(),
            last_login,
            last_document_access,
            last_seen,
            last_api_activity,
            activity_score: inactivity.map(|days| activity_score(days, threshold_days)),
            inactivity_days: inactivity,
            inactivity_threshold_days: threshold_days,
            health_check_status: inactivity.map(|days| health_status(days, threshold_days)),
            consecutive_missed_checks: consecutive_missed_checks(&checks),
            computed_at: now,
        };

        debug!(
            inactivity_days = ?snapshot.inactivity_days,
            activity_score = ?snapshot.activity_score,
            status = ?snapshot.health_check_status,
            missed = snapshot.consecutive_missed_checks,
            "activity computed"
        );
        Ok(snapshot)
    }
}

fn latest_of(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Whole days elapsed since `last_activity`, never negative.
pub fn inactivity_days(now: DateTime<Utc>, last_activity: DateTime<Utc>) -> i64 {
    (now - last_activity).num_days().max(0)
}

/// `max(0, 100 - 100 * days / threshold)`.
pub fn activity_score(inactivity_days: i64, threshold_days: i64) -> f64 {
    let threshold = threshold_days.max(1) as f64;
    let score = 100.0 - 100.0 * inactivity_days.max(0) as f64 / threshold;
    score.clamp(0.0, 100.0)
}

/// Classify inactivity against the threshold: up to 50% healthy, up to 80%
/// warning, up to 100% critical, beyond that unresponsive.
pub fn health_status(inactivity_days: i64, threshold_days: i64) -> HealthStatus {
    let days = i128::from(inactivity_days.max(0));
    let threshold = i128::from(threshold_days.max(1));

    if days * 100 <= threshold * 50 {
        HealthStatus::Healthy
    } else if days * 100 <= threshold * 80 {
        HealthStatus::Warning
    } else if days <= threshold {
        HealthStatus::Critical
    } else {
        HealthStatus::Unresponsive
    }
}

/// Length of the unbroken run of missed checks at the head of `checks`
/// (most recent first).
pub fn consecutive_missed_checks(checks: &[HealthCheck]) -> u32 {
    let streak = checks.iter().take_while(|c| c.is_missed()).count();
    u32::try_from(streak).unwrap_or(u32::MAX)
}
