//! Escalation and expiry sweep.
//!
//! Deadlines are stored on each activation, so the sweep can run from any
//! process at any interval and picks up where a restarted one left off.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shield_notifier::{ReminderKind, Template};
use shield_storage::ActivationStore;
use shield_types::{ActivationStatus, EmergencyActivation, Guardian, GuardianId, NotificationKind};
use tracing::{error, info, instrument, warn};

use crate::config::EscalationMode;
use crate::error::EmergencyResult;
use crate::service::EmergencyService;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationReport {
    pub escalated: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Guardians to contact in the next round.
///
/// `eligible` is in priority order. `NextTier` takes every uncontacted
/// guardian sharing the best remaining priority; when everyone has been
/// contacted it falls back to reminding those who have not answered.
pub fn escalation_targets(
    mode: EscalationMode,
    eligible: &[Guardian],
    notified: &[GuardianId],
    answered: &BTreeSet<GuardianId>,
) -> Vec<Guardian> {
    let unanswered = || {
        eligible
            .iter()
            .filter(|g| notified.contains(&g.id) && !answered.contains(&g.id))
            .cloned()
            .collect::<Vec<_>>()
    };

    match mode {
        EscalationMode::SameSet => unanswered(),
        EscalationMode::NextTier => {
            let fresh = eligible
                .iter()
                .filter(|g| !notified.contains(&g.id))
                .collect::<Vec<_>>();
            match fresh.first() {
                Some(next) => {
                    let tier = next.priority();
                    fresh
                        .into_iter()
                        .filter(|g| g.priority() == tier)
                        .cloned()
                        .collect()
                }
                None => unanswered(),
            }
        }
    }
}

enum SweepAction {
    Escalated,
    Expired,
    Skipped,
}

impl EmergencyService {
    /// Escalate every pending activation whose response window has passed
    /// and expire the ones whose token has lapsed or whose rounds are used up.
    ///
    /// One failing activation does not stop the sweep.
    #[instrument(skip(self))]
    pub async fn process_escalations(
        &self,
        now: DateTime<Utc>,
    ) -> EmergencyResult<EscalationReport> {
        let pending = self
            .storage
            .list_activations_by_status(ActivationStatus::Pending)
            .await?;
        let mut report = EscalationReport::default();

        for activation in pending {
            match self.sweep_activation(&activation, now).await {
                Ok(SweepAction::Escalated) => report.escalated += 1,
                Ok(SweepAction::Expired) => report.expired += 1,
                Ok(SweepAction::Skipped) => {}
                Err(err) => {
                    error!(activation_id = %activation.id, error = %err, "escalation failed");
                    report.failed += 1;
                }
            }
        }

        if report != EscalationReport::default() {
            info!(
                escalated = report.escalated,
                expired = report.expired,
                failed = report.failed,
                "escalation sweep complete"
            );
        }
        Ok(report)
    }

    async fn sweep_activation(
        &self,
        listed: &EmergencyActivation,
        now: DateTime<Utc>,
    ) -> EmergencyResult<SweepAction> {
        let lock = self.user_lock(&listed.user_id);
        let _guard = lock.lock().await;

        let Some(mut activation) = self.storage.get_activation(&listed.id).await? else {
            return Ok(SweepAction::Skipped);
        };
        if !activation.is_pending() {
            return Ok(SweepAction::Skipped);
        }

        if activation.token_expired(now) {
            self.expire(activation, now, "verification token expired").await?;
            return Ok(SweepAction::Expired);
        }
        if !activation.escalation_due(now) {
            return Ok(SweepAction::Skipped);
        }
        if activation.escalation_round >= self.config.max_escalation_rounds {
            self.expire(activation, now, "escalation rounds exhausted").await?;
            return Ok(SweepAction::Expired);
        }

        let eligible = self.eligible_guardians(&activation.user_id).await?;
        let answered = self
            .storage
            .list_responses(&activation.id)
            .await?
            .into_iter()
            .map(|r| r.guardian_id)
            .collect::<BTreeSet<_>>();
        let targets = escalation_targets(
            self.config.escalation_mode,
            &eligible,
            &activation.notified_guardians,
            &answered,
        );

        activation.escalation_round += 1;
        activation.next_escalation_at = Some(now + self.config.escalation_response_window());
        activation.updated_at = now;
        for guardian in &targets {
            if !activation.notified_guardians.contains(&guardian.id) {
                activation.notified_guardians.push(guardian.id.clone());
            }
        }
        self.storage
            .update_pending_activation(activation.clone())
            .await?;

        if targets.is_empty() {
            warn!(
                activation_id = %activation.id,
                round = activation.escalation_round,
                "no guardian left to escalate to"
            );
        } else {
            let reminder = ReminderKind::for_round(activation.escalation_round);
            let title = format!("{}: Emergency Activation Request", reminder.label());
            self.notify(
                &activation,
                &targets,
                Template::reminder(reminder),
                NotificationKind::VerificationNeeded,
                &title,
            )
            .await;
            info!(
                activation_id = %activation.id,
                round = activation.escalation_round,
                guardians = targets.len(),
                reminder = reminder.as_str(),
                "activation escalated"
            );
        }
        Ok(SweepAction::Escalated)
    }

    async fn expire(
        &self,
        mut activation: EmergencyActivation,
        now: DateTime<Utc>,
        why: &str,
    ) -> EmergencyResult<()> {
        activation.status = ActivationStatus::Expired;
        activation.next_escalation_at = None;
        activation.updated_at = now;
        self.storage
            .update_pending_activation(activation.clone())
            .await?;
        self.release_shield(&activation.user_id).await?;
        warn!(activation_id = %activation.id, reason = why, "activation expired");
        Ok(())
    }
}
