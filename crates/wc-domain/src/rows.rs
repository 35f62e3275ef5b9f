//! Persisted row shapes per WC-SPEC §3. These are the in-memory (and, for
//! `sqlx::FromRow`-style adapters, wire) representations of the Store's
//! durable tables; the Store owns all mutation of the underlying rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CausationId, CorrelationId, EventId, InstanceId, MessageId, StreamId};
use crate::status::{PerspectiveProcessingStatus, ReceptorProcessingStatus, RowStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub causation_id: Option<CausationId>,
    pub message_type: String,
    pub stream_id: StreamId,
    pub partition_number: u32,
    pub sequence_order: i64,
    pub topic: String,
    pub payload_bytes: Vec<u8>,
    pub status: RowStatus,
    pub instance_id: Option<InstanceId>,
    pub lease_expiry: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRow {
    /// Invariant per WC-SPEC §3: `Stored` rows carry no owner/lease;
    /// `Claimed` rows carry both and the lease must be in the future.
    pub fn invariants_hold(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RowStatus::Stored => self.instance_id.is_none() && self.lease_expiry.is_none(),
            RowStatus::Claimed => matches!(
                (self.instance_id, self.lease_expiry),
                (Some(_), Some(expiry)) if expiry > now
            ),
            RowStatus::Failed | RowStatus::DeadLettered => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxRow {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub causation_id: Option<CausationId>,
    pub message_type: String,
    pub stream_id: StreamId,
    pub partition_number: u32,
    pub sequence_order: i64,
    pub source_topic: String,
    pub payload_bytes: Vec<u8>,
    pub status: RowStatus,
    pub instance_id: Option<InstanceId>,
    pub lease_expiry: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// `(StreamId, Version)` keyed, append-only history row, per WC-SPEC §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStoreRow {
    pub event_id: EventId,
    pub stream_id: StreamId,
    pub aggregate_type: String,
    pub version: i64,
    pub global_sequence: i64,
    pub payload_bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Derive the aggregate type from a message type by stripping the event
/// suffix convention (default `"Event"`), per WC-SPEC §3.
pub fn aggregate_type_from_message_type(message_type: &str, event_suffix: &str) -> String {
    message_type
        .strip_suffix(event_suffix)
        .unwrap_or(message_type)
        .to_string()
}

/// One row per (event, receptor) invocation; retained for auditing, per
/// WC-SPEC §3. Not consulted for skip decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorProcessingRow {
    pub event_id: EventId,
    pub receptor_name: String,
    pub status: ReceptorProcessingStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One row per `(StreamId, PerspectiveName)`, per WC-SPEC §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerspectiveCheckpointRow {
    pub stream_id: StreamId,
    pub perspective_name: String,
    pub last_event_id: EventId,
    pub last_sequence_number: i64,
    pub status: PerspectiveProcessingStatus,
    pub updated_at: DateTime<Utc>,
}

impl PerspectiveCheckpointRow {
    /// Invariant per WC-SPEC §3 / §8 invariant 5: a checkpoint only advances
    /// by sequence number strictly greater than the current one.
    pub fn may_advance_to(&self, candidate_sequence: i64) -> bool {
        candidate_sequence > self.last_sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_default_event_suffix() {
        assert_eq!(
            aggregate_type_from_message_type("OrderCreatedEvent", "Event"),
            "OrderCreated"
        );
    }

    #[test]
    fn leaves_non_matching_type_untouched() {
        assert_eq!(
            aggregate_type_from_message_type("CreateOrder", "Event"),
            "CreateOrder"
        );
    }

    #[test]
    fn checkpoint_only_advances_strictly_forward() {
        let checkpoint = PerspectiveCheckpointRow {
            stream_id: StreamId::new(),
            perspective_name: "OrderSummary".to_string(),
            last_event_id: EventId::new(),
            last_sequence_number: 5,
            status: PerspectiveProcessingStatus::UpToDate,
            updated_at: Utc::now(),
        };
        assert!(!checkpoint.may_advance_to(5));
        assert!(!checkpoint.may_advance_to(4));
        assert!(checkpoint.may_advance_to(6));
    }

    #[test]
    fn stored_row_rejects_owner_or_lease() {
        let now = Utc::now();
        let mut row = OutboxRow {
            message_id: MessageId::new(),
            correlation_id: CorrelationId::new(),
            causation_id: None,
            message_type: "CreateOrder".to_string(),
            stream_id: StreamId::new(),
            partition_number: 0,
            sequence_order: 1,
            topic: "orders".to_string(),
            payload_bytes: vec![],
            status: RowStatus::Stored,
            instance_id: None,
            lease_expiry: None,
            retry_count: 0,
            last_error: None,
            created_at: now,
        };
        assert!(row.invariants_hold(now));
        row.instance_id = Some(InstanceId::new());
        assert!(!row.invariants_hold(now));
    }
}
