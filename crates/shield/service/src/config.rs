//! Emergency service configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Who is contacted when an activation goes unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationMode {
    /// The next-priority guardians not yet contacted. Once everyone has been
    /// contacted, the guardians who have not answered are reminded.
    #[default]
    NextTier,
    /// Remind the guardians already contacted who have not answered.
    SameSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Lifetime of a verification token.
    #[serde(default = "default_verification_timeout_hours")]
    pub guardian_verification_timeout_hours: i64,

    /// A pending activation younger than this suppresses new triggers.
    #[serde(default = "default_window_hours")]
    pub suppression_window_hours: i64,

    /// Time guardians get to answer before the next escalation round.
    #[serde(default = "default_window_hours")]
    pub escalation_response_window_hours: i64,

    #[serde(default = "default_max_escalation_rounds")]
    pub max_escalation_rounds: u32,

    #[serde(default)]
    pub escalation_mode: EscalationMode,

    /// Guardians contacted in the first round. Raised to the quorum size
    /// when that is larger.
    #[serde(default = "default_initial_notify_count")]
    pub initial_notify_count: usize,

    /// Verification page; the token is appended as a query parameter.
    #[serde(default = "default_verification_base_url")]
    pub verification_base_url: String,
}

fn default_verification_timeout_hours() -> i64 {
    7 * 24
}

fn default_window_hours() -> i64 {
    24
}

fn default_max_escalation_rounds() -> u32 {
    3
}

fn default_initial_notify_count() -> usize {
    1
}

fn default_verification_base_url() -> String {
    "https://localhost/emergency/verify".to_string()
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            guardian_verification_timeout_hours: default_verification_timeout_hours(),
            suppression_window_hours: default_window_hours(),
            escalation_response_window_hours: default_window_hours(),
            max_escalation_rounds: default_max_escalation_rounds(),
            escalation_mode: EscalationMode::default(),
            initial_notify_count: default_initial_notify_count(),
            verification_base_url: default_verification_base_url(),
        }
    }
}

impl EmergencyConfig {
    pub fn verification_timeout(&self) -> Duration {
        Duration::hours(self.guardian_verification_timeout_hours)
    }

    pub fn suppression_window(&self) -> Duration {
        Duration::hours(self.suppression_window_hours)
    }

    pub fn escalation_response_window(&self) -> Duration {
        Duration::hours(self.escalation_response_window_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EmergencyConfig::default();
        assert_eq!(config.verification_timeout(), Duration::days(7));
        assert_eq!(config.suppression_window(), Duration::hours(24));
        assert_eq!(config.escalation_response_window(), Duration::hours(24));
        assert_eq!(config.max_escalation_rounds, 3);
        assert_eq!(config.escalation_mode, EscalationMode::NextTier);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: EmergencyConfig =
            serde_json::from_str(r#"{"escalation_mode":"same_set","max_escalation_rounds":5}"#)
                .unwrap();
        assert_eq!(config.escalation_mode, EscalationMode::SameSet);
        assert_eq!(config.max_escalation_rounds, 5);
        assert_eq!(config.suppression_window_hours, 24);
        assert_eq!(config.initial_notify_count, 1);
    }
}
