//! Guardian Shield Types - Core types for emergency activation and guardian access
//!
//! The shield watches for signs that a user is incapacitated or unreachable,
//! escalates to pre-designated guardians, and grants those guardians
//! time-bounded, scope-limited access to the user's stored resources.
//!
//! ## Key Concepts
//!
//! - **ActivitySnapshot**: Derived view of how recently a user was active
//! - **ShieldSettings**: Per-user toggle, thresholds and shield status
//! - **EmergencyActivation**: One emergency workflow from trigger to quorum or expiry
//! - **AccessRequest**: A guardian's scoped, time-bounded grant
//! - **AccessLogEntry**: Append-only audit record for every access decision
//! - **GuardianNotification**: Persisted record of a delivered (or failed) notice

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// serde representation is the same snake_case tag used by the store.
macro_rules! string_tags {
    ($ty:ident, $kind:literal, { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $tag,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::ParseTagError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($ty::$variant),)+
                    other => Err($crate::ParseTagError::new($kind, other)),
                }
            }
        }
    };
}

pub mod access;
pub mod activation;
pub mod activity;
pub mod clock;
pub mod guardian;
pub mod ids;
pub mod notification;
pub mod settings;

pub use access::{
    AccessAction, AccessLogEntry, AccessRequest, AccessScope, AccessStatus, AccessorType, Urgency,
};
pub use activation::{
    ActivationStatus, EmergencyActivation, GuardianDecision, GuardianResponse, TriggerType,
};
pub use activity::{
    ActivitySnapshot, HealthCheck, HealthCheckKind, HealthCheckOutcome, HealthStatus,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use guardian::{Guardian, GuardianPermissions};
pub use ids::{AccessRequestId, ActivationId, GuardianId, NotificationId, UserId};
pub use notification::{
    DeliveryMethod, DeliveryStatus, GuardianNotification, NotificationKind, NotificationPriority,
};
pub use settings::{ShieldSettings, ShieldStatus};

/// Error raised when parsing one of the string-tagged enums fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseTagError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseTagError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
