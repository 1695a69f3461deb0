//! Failure taxonomy and persisted retry bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a per-unit failure.
///
/// Collaborator error enums expose a `kind()` accessor returning one of
/// these variants; the orchestrator only ever branches on the kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Momentary condition (timeout, rate limit, lock contention).
    /// Retried automatically under backoff.
    Transient,
    /// Exhausted retries or unclassifiable. Surfaced, never retried.
    Permanent,
    /// The source bytes themselves are bad. Retrying the same input
    /// cannot succeed; requires re-acquisition or an operator skip.
    CorruptInput,
    /// Disk budget denied the operation. The unit waits, it is not failed.
    ResourceExhausted,
}

impl FailureKind {
    /// Returns true if this kind is eligible for automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }

    /// Returns the kind as a string (for storage and filtering).
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::CorruptInput => "corrupt_input",
            FailureKind::ResourceExhausted => "resource_exhausted",
        }
    }

    /// Parses a stored kind string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(FailureKind::Transient),
            "permanent" => Some(FailureKind::Permanent),
            "corrupt_input" => Some(FailureKind::CorruptInput),
            "resource_exhausted" => Some(FailureKind::ResourceExhausted),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted retry bookkeeping for one unit (archive or media item).
///
/// Survives restarts so retry budgets are not reset by a crash.
/// Cleared when the unit's next attempt succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryRecord {
    /// The archive or media item this record belongs to.
    pub unit_id: String,
    /// Classification of the failure that scheduled this retry.
    pub kind: FailureKind,
    /// Attempts made so far (1-indexed after the first failure).
    pub attempts: u32,
    /// The unit is not re-admitted before this time.
    pub next_retry_at: DateTime<Utc>,
    /// Phase the unit was reset to, stored as its string form.
    pub resume_phase: String,
    /// When this retry was scheduled.
    pub scheduled_at: DateTime<Utc>,
}

impl RetryRecord {
    /// Returns true if the retry is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }
}
