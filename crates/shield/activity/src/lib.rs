//! Guardian Shield activity tracking.
//!
//! Aggregates independent activity signals into an
//! [`ActivitySnapshot`](shield_types::ActivitySnapshot): how long the user has
//! been quiet, a 0-100 activity score and the recent missed health-check streak.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

mod error;
pub mod signals;
pub mod tracker;

pub use error::{ActivityError, ActivityResult};
pub use signals::{ActivitySource, SignalKind, StaticActivitySource};
pub use tracker::{
    activity_score, consecutive_missed_checks, health_status, inactivity_days, ActivityTracker,
    DEFAULT_THRESHOLD_DAYS, HEALTH_CHECK_WINDOW,
};
