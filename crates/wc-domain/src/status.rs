//! Status enums per WC-SPEC §6.

use serde::{Deserialize, Serialize};

/// Wire-level bitset-compatible processing status per WC-SPEC §6.
/// Not every value is meaningful for every row kind; outbox/inbox rows use
/// the narrower [`RowStatus`] internally and translate to/from this at the
/// `ProcessWorkBatch` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageProcessingStatus {
    Stored = 1,
    Published = 2,
    Completed = 4,
    Failed = 8,
}

/// Lifecycle of a single outbox or inbox row, per WC-SPEC §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    /// Durable, unclaimed, eligible for claim.
    Stored,
    /// Owned by an instance with a live lease.
    Claimed,
    /// Last attempt failed; retry_count has been incremented.
    Failed,
    /// retry_count has exceeded `max_retries`; excluded from claim and
    /// visible only to operator tooling.
    DeadLettered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceptorProcessingStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerspectiveProcessingStatus {
    UpToDate,
    Lagging,
    Failed,
}

/// Outcome of driving a single claimed message through an action function
/// inside the Ordered Stream Processor (WC-SPEC §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Published (outbox) or Handled (inbox) successfully.
    Success,
    /// Retryable failure; retry_count advances, lease releases.
    TransientFailure { error: String },
    /// Non-retryable failure; dead-letters immediately.
    PermanentFailure { error: String },
    /// Cancellation observed mid-flight; treated as a handler error with
    /// kind `Cancelled` and does not count toward the permanent-failure
    /// dead-letter threshold.
    Cancelled,
}
