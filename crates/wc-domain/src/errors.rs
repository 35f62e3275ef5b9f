//! Error taxonomy per WC-SPEC §7.

use thiserror::Error;

/// The top-level error taxonomy shared by the coordinator, workers, and
/// dispatcher. Adapters (Store, Transport) define their own lower-level
/// error enums and convert into these at the port boundary.
#[derive(Debug, Error)]
pub enum WorkCoordinatorError {
    /// Malformed envelope, missing `StreamId` on an event, or out-of-range
    /// tuning. Nothing persists.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Event-store version conflict. The whole batch is aborted.
    #[error("concurrency conflict on stream {stream_id}: expected version {expected}, found {actual}")]
    Concurrency {
        stream_id: String,
        expected: i64,
        actual: i64,
    },

    /// Publish/receive failed retryably. Recorded as a failure; retry
    /// counter advances; lease releases.
    #[error("transient transport error: {reason}")]
    TransientTransport { reason: String },

    /// Recorded as a failure; dead-letters immediately.
    #[error("permanent transport error: {reason}")]
    PermanentTransport { reason: String },

    /// A perspective or receptor raised an error. Recorded as an inbox or
    /// receptor failure; retry counter advances.
    #[error("handler error: {reason}")]
    Handler { reason: String },

    /// Treated as a handler error with kind `Cancelled`; does not count as
    /// a permanent failure toward dead-lettering.
    #[error("cancelled")]
    Cancelled,

    /// Underlying storage failure not otherwise classified (e.g. connection
    /// loss). The caller should treat any queued state as unflushed.
    #[error("storage error: {reason}")]
    Storage { reason: String },
}

impl WorkCoordinatorError {
    /// Whether this error, if it causes an outbox/inbox failure, should
    /// immediately dead-letter the row rather than advance retry_count and
    /// allow further attempts (WC-SPEC §7).
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::PermanentTransport { .. })
    }

    /// `Cancelled` must never itself count toward the permanent-failure
    /// dead-letter threshold (WC-SPEC §7).
    pub fn counts_toward_dead_letter(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_transport_is_permanent() {
        let error = WorkCoordinatorError::PermanentTransport {
            reason: "rejected".to_string(),
        };
        assert!(error.is_permanent());
    }

    #[test]
    fn cancelled_does_not_count_toward_dead_letter() {
        let error = WorkCoordinatorError::Cancelled;
        assert!(!error.counts_toward_dead_letter());
        assert!(!error.is_permanent());
    }

    #[test]
    fn handler_error_counts_but_is_not_permanent() {
        let error = WorkCoordinatorError::Handler {
            reason: "boom".to_string(),
        };
        assert!(error.counts_toward_dead_letter());
        assert!(!error.is_permanent());
    }
}
