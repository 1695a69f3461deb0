//! Failure classification and retry scheduling.
//!
//! Every collaborator error is mapped into the closed [`FailureKind`]
//! taxonomy at the module boundary; nothing downstream branches on raw
//! error shapes. The [`RetryPolicy`] turns a classified failure plus an
//! attempt count into a scheduling decision with jittered exponential
//! backoff.

mod classifier;
mod types;

pub use classifier::{RetryDecision, RetryPolicy};
pub use types::{FailureKind, RetryRecord};
