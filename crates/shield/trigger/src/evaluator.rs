//! Trigger evaluator.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shield_activity::ActivityTracker;
use shield_storage::{ActivationStore, ShieldSettingsStore, ShieldStorage};
use shield_types::{ActivitySnapshot, Clock, ShieldSettings, ShieldStatus, TriggerType, UserId};
use tracing::{debug, info, instrument};

use crate::error::TriggerResult;

/// Pending activations younger than this suppress new triggers.
pub const DEFAULT_SUPPRESSION_WINDOW_HOURS: i64 = 24;

/// Missed-check streak that starts an activation on its own.
pub const HEALTH_FAILURE_MISSED_CHECKS: u32 = 5;

/// Missed-check streak that raises severity without triggering.
pub const HEALTH_WARNING_MISSED_CHECKS: u32 = 3;

/// How serious the evaluated situation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Whether the situation warrants alerting an operator.
    pub fn should_alert(&self) -> bool {
        *self >= Severity::High
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvaluation {
    pub user_id: UserId,
    pub should_trigger: bool,
    pub trigger_type: Option<TriggerType>,
    pub severity: Severity,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
    /// Absent when the shield is disabled.
    pub snapshot: Option<ActivitySnapshot>,
    pub evaluated_at: DateTime<Utc>,
}

impl TriggerEvaluation {
    fn quiet(user_id: UserId, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            should_trigger: false,
            trigger_type: None,
            severity: Severity::Low,
            reasons: vec![reason.into()],
            recommendations: Vec::new(),
            snapshot: None,
            evaluated_at: at,
        }
    }

    fn raise(&mut self, severity: Severity) {
        self.severity = self.severity.max(severity);
    }

    fn fire(&mut self, trigger_type: TriggerType) {
        // first hard trigger wins
        if self.trigger_type.is_none() {
            self.trigger_type = Some(trigger_type);
            self.should_trigger = true;
        }
    }
}

/// Apply the ordered rules to an activity snapshot.
///
/// Does not look at the enabled flag or at pending activations; those gates
/// belong to [`TriggerEvaluator::evaluate`].
pub fn evaluate_snapshot(
    settings: &ShieldSettings,
    snapshot: ActivitySnapshot,
    at: DateTime<Utc>,
) -> TriggerEvaluation {
    let threshold = settings.inactivity_threshold_days();
    let days = snapshot.inactivity_days;
    let missed = snapshot.consecutive_missed_checks;

    let mut eval = TriggerEvaluation {
        user_id: settings.user_id.clone(),
        should_trigger: false,
        trigger_type: None,
        severity: Severity::Low,
        reasons: Vec::new(),
        recommendations: Vec::new(),
        snapshot: None,
        evaluated_at: at,
    };

    let pct = |days: i64, p: i64| i128::from(days) * 100 > i128::from(threshold) * i128::from(p);
    match days {
        None => {
            eval.reasons
                .push("No activity signals available; inactivity rules skipped".to_string());
        }
        Some(days) if days > threshold => {
            eval.raise(Severity::Critical);
            eval.fire(TriggerType::InactivityDetected);
            eval.reasons.push(format!(
                "No activity for {days} days, past the {threshold}-day threshold"
            ));
        }
        Some(days) if pct(days, 80) => {
            eval.raise(Severity::High);
            eval.reasons.push(format!(
                "No activity for {days} days, over 80% of the {threshold}-day threshold"
            ));
            eval.recommendations.push(
                "Send the user an inactivity warning before guardians are contacted".to_string(),
            );
        }
        Some(days) if pct(days, 50) => {
            eval.raise(Severity::Medium);
            eval.reasons.push(format!(
                "No activity for {days} days, over half of the {threshold}-day threshold"
            ));
            eval.recommendations
                .push("Send the user a gentle check-in reminder".to_string());
        }
        Some(_) => {}
    }

    if missed >= HEALTH_FAILURE_MISSED_CHECKS {
        eval.raise(Severity::High);
        eval.fire(TriggerType::HealthCheckFailure);
        eval.reasons
            .push(format!("{missed} consecutive health checks missed"));
    } else if missed >= HEALTH_WARNING_MISSED_CHECKS {
        eval.raise(Severity::Medium);
        eval.reasons
            .push(format!("{missed} consecutive health checks missed"));
        eval.recommendations
            .push("Increase health check frequency".to_string());
    }

    if eval.reasons.is_empty() {
        eval.reasons
            .push("Activity within the configured threshold".to_string());
    }

    eval.snapshot = Some(snapshot);
    eval
}

/// Decides whether a user's situation warrants an emergency activation.
pub struct TriggerEvaluator {
    storage: Arc<dyn ShieldStorage>,
    tracker: Arc<ActivityTracker>,
    clock: Arc<dyn Clock>,
    suppression_window: Duration,
}

impl TriggerEvaluator {
    pub fn new(
        storage: Arc<dyn ShieldStorage>,
        tracker: Arc<ActivityTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            tracker,
            clock,
            suppression_window: Duration::hours(DEFAULT_SUPPRESSION_WINDOW_HOURS),
        }
    }

    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = window;
        self
    }

    /// Evaluate `user_id`.
    ///
    /// A disabled (or unconfigured) shield returns immediately without
    /// computing activity.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn evaluate(&self, user_id: &UserId) -> TriggerResult<TriggerEvaluation> {
        let now = self.clock.now();

        let settings = match self.storage.get_settings(user_id).await? {
            Some(settings) if settings.is_enabled => settings,
            _ => {
                debug!("shield disabled, skipping evaluation");
                return Ok(TriggerEvaluation::quiet(
                    user_id.clone(),
                    "Guardian Shield is not enabled for this user",
                    now,
                ));
            }
        };

        let snapshot = self.tracker.compute_activity(user_id).await?;
        let mut eval = evaluate_snapshot(&settings, snapshot, now);

        if settings.shield_status == ShieldStatus::Active && eval.should_trigger {
            eval.should_trigger = false;
            eval.reasons
                .push("Shield is already active; no new activation needed".to_string());
        }

        if let Some(pending) = self.storage.pending_activation_for_user(user_id).await? {
            if now - pending.created_at < self.suppression_window && eval.should_trigger {
                eval.should_trigger = false;
                eval.reasons.push(format!(
                    "Suppressed: {} has been awaiting guardian response since {}",
                    pending.id,
                    pending.created_at.to_rfc3339()
                ));
                info!(activation_id = %pending.id, "trigger suppressed by pending activation");
            }
        }

        debug!(
            should_trigger = eval.should_trigger,
            severity = %eval.severity,
            "trigger evaluated"
        );
        Ok(eval)
    }
}
