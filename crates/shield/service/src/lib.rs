//! Guardian Shield emergency service.
//!
//! Starts an emergency activation when a user's trigger evaluation calls for
//! one, notifies guardians in priority order, collects their verdicts until
//! the configured quorum is reached, and escalates or expires activations
//! nobody answers. Once the shield is active, [`AccessControl`] starts
//! honouring guardian access requests.
//!
//! [`AccessControl`]: shield_access::AccessControl

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
mod error;
pub mod escalation;
pub mod messages;
pub mod service;
pub mod verification;

pub use config::{EmergencyConfig, EscalationMode};
pub use error::{EmergencyError, EmergencyResult, TokenRejection};
pub use escalation::{escalation_targets, EscalationReport};
pub use service::{ActivationStatusReport, EmergencyService, MonitorReport, SystemStatus};
pub use verification::ResponseOutcome;
