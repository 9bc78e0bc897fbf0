//! Guardian verification and quorum.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use shield_storage::{ActivationStore, ShieldSettingsStore, StorageError};
use shield_types::{
    ActivationStatus, Clock, EmergencyActivation, GuardianDecision, GuardianId, GuardianResponse,
    ShieldStatus,
};
use tracing::{info, instrument, warn};

use crate::error::{EmergencyError, EmergencyResult, TokenRejection};
use crate::service::EmergencyService;

/// What a guardian's answer did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseOutcome {
    pub activation: EmergencyActivation,
    pub decision: GuardianDecision,
    pub confirmations: usize,
    pub required_confirmations: u32,
    pub shield_status: ShieldStatus,
}

/// Distinct guardians that confirmed.
pub(crate) fn distinct_confirmations(responses: &[GuardianResponse]) -> usize {
    responses
        .iter()
        .filter(|r| r.decision == GuardianDecision::Confirmed)
        .map(|r| &r.guardian_id)
        .collect::<BTreeSet<_>>()
        .len()
}

impl EmergencyService {
    /// Record a guardian's decision on the activation carrying `token`.
    ///
    /// A rejected token changes nothing. The shield becomes active only
    /// after the quorum-reaching response and the approved activation are
    /// both stored.
    #[instrument(
        skip(self, token, notes),
        fields(guardian_id = %guardian_id, decision = %decision)
    )]
    pub async fn record_guardian_response(
        &self,
        token: &str,
        guardian_id: &GuardianId,
        decision: GuardianDecision,
        notes: Option<String>,
    ) -> EmergencyResult<ResponseOutcome> {
        let Some(found) = self.storage.find_activation_by_token(token).await? else {
            return Err(EmergencyError::token(TokenRejection::Unknown));
        };

        let lock = self.user_lock(&found.user_id);
        let _guard = lock.lock().await;

        let mut activation = self
            .storage
            .get_activation(&found.id)
            .await?
            .ok_or_else(|| EmergencyError::token(TokenRejection::Unknown))?;
        let now = self.clock.now();

        if !activation.is_pending() {
            return Err(EmergencyError::token(TokenRejection::NotPending));
        }
        if activation.token_expired(now) {
            return Err(EmergencyError::token(TokenRejection::Expired));
        }

        let eligible = self.eligible_guardians(&activation.user_id).await?;
        if !eligible.iter().any(|g| &g.id == guardian_id) {
            return Err(EmergencyError::GuardianNotEligible(guardian_id.clone()));
        }

        let mut responses = self.storage.list_responses(&activation.id).await?;
        if responses.iter().any(|r| &r.guardian_id == guardian_id) {
            return Err(EmergencyError::token(TokenRejection::AlreadyUsed));
        }

        let response = GuardianResponse {
            activation_id: activation.id,
            guardian_id: guardian_id.clone(),
            decision,
            notes,
            responded_at: now,
        };
        match self.storage.record_response(response.clone()).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(EmergencyError::token(TokenRejection::AlreadyUsed))
            }
            Err(err) => return Err(err.into()),
        }
        responses.push(response);

        let settings = self.settings(&activation.user_id).await?;
        let quorum = settings.quorum();
        let confirmations = distinct_confirmations(&responses);
        let mut shield_status = settings.shield_status;

        match decision {
            GuardianDecision::Confirmed if confirmations >= quorum as usize => {
                activation.status = ActivationStatus::Approved;
                activation.next_escalation_at = None;
                activation.updated_at = now;
                self.storage
                    .update_pending_activation(activation.clone())
                    .await?;

                if shield_status != ShieldStatus::Active {
                    self.storage
                        .transition_shield_status(
                            &activation.user_id,
                            shield_status,
                            ShieldStatus::Active,
                            now,
                        )
                        .await?;
                    shield_status = ShieldStatus::Active;
                }
                info!(
                    activation_id = %activation.id,
                    confirmations,
                    "quorum reached, shield active"
                );
            }
            GuardianDecision::Confirmed => {
                info!(
                    activation_id = %activation.id,
                    confirmations,
                    required = quorum,
                    "confirmation recorded"
                );
            }
            GuardianDecision::Denied => {
                let answered = responses
                    .iter()
                    .map(|r| &r.guardian_id)
                    .collect::<BTreeSet<_>>();
                let undecided = eligible.iter().filter(|g| !answered.contains(&g.id)).count();

                if confirmations + undecided < quorum as usize {
                    activation.status = ActivationStatus::Denied;
                    activation.next_escalation_at = None;
                    activation.updated_at = now;
                    self.storage
                        .update_pending_activation(activation.clone())
                        .await?;
                    self.release_shield(&activation.user_id).await?;
                    shield_status = self.settings(&activation.user_id).await?.shield_status;
                    warn!(activation_id = %activation.id, "activation denied by guardians");
                } else {
                    info!(activation_id = %activation.id, undecided, "denial recorded");
                }
            }
        }

        Ok(ResponseOutcome {
            activation,
            decision,
            confirmations,
            required_confirmations: quorum,
            shield_status,
        })
    }
}
