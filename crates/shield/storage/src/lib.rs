//! Guardian Shield storage abstractions.
//!
//! This crate defines the storage contract for the shield components:
//! - per-user shield settings and the shield status state machine
//! - guardians and their permission flags
//! - emergency activations and guardian responses
//! - persisted guardian notifications
//! - health-check history
//! - guardian access requests and the append-only access audit
//!
//! Postgres is the transactional source of truth. The in-memory adapter
//! mirrors its conflict semantics for tests and single-process use.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{
    AccessAuditStore, AccessRequestStore, ActivationStore, GuardianStore, HealthCheckStore,
    NotificationStore, ShieldSettingsStore, ShieldStorage,
};
