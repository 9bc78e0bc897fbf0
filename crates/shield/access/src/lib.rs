//! Guardian Shield access control.
//!
//! Guardians ask for scoped access to a user's resources; a request is
//! approved or denied once and may be revoked at any time. Approved grants
//! lapse on their own when their duration runs out.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod boundary;
pub mod control;
mod error;

pub use boundary::{AccessContext, AccessDecision, SURVIVOR_SCOPES};
pub use control::{AccessControl, CreateAccessRequest};
pub use error::{AccessError, AccessResult};
