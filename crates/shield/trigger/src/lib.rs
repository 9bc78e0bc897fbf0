//! Guardian Shield trigger evaluation.
//!
//! Turns an activity snapshot plus the user's shield settings into a
//! severity-graded recommendation. Evaluation only reads; starting an
//! activation is the orchestrator's job.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

mod error;
mod evaluator;

pub use error::{TriggerError, TriggerResult};
pub use evaluator::{
    evaluate_snapshot, Severity, TriggerEvaluation, TriggerEvaluator,
    DEFAULT_SUPPRESSION_WINDOW_HOURS, HEALTH_FAILURE_MISSED_CHECKS, HEALTH_WARNING_MISSED_CHECKS,
};
