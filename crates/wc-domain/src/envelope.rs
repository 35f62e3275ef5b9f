//! `MessageEnvelope` per WC-SPEC §3 — the shared header carried by every outbox
//! and inbox row (C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CausationId, CorrelationId, MessageId, StreamId};

/// One hop a message has crossed — appended to, never mutated, per the
/// "cyclic references" re-architecture guidance in WC-SPEC §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    pub service: String,
    pub received_at: Option<DateTime<Utc>>,
    pub emitted_at: DateTime<Utc>,
}

/// Shared header carrying identity, correlation, causation, stream,
/// partition, timestamps, and hop chain (WC-SPEC §3, C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub causation_id: Option<CausationId>,
    pub message_type: String,
    pub stream_id: StreamId,
    pub partition_number: u32,
    pub sequence_order: i64,
    pub hops: Vec<Hop>,
    pub created_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// `HopCount` is carried as a distinct field on the wire for compactness,
    /// but deriving it here keeps the in-memory type from being able to
    /// disagree with itself.
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Append a hop marking this service's entry into the message's path.
    /// Older hops are never touched.
    pub fn append_hop(&mut self, service: impl Into<String>, received_at: Option<DateTime<Utc>>, emitted_at: DateTime<Utc>) {
        self.hops.push(Hop {
            service: service.into(),
            received_at,
            emitted_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope {
            message_id: MessageId::new(),
            correlation_id: CorrelationId::new(),
            causation_id: None,
            message_type: "OrderCreatedEvent".to_string(),
            stream_id: StreamId::new(),
            partition_number: 42,
            sequence_order: 1,
            hops: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn hop_count_tracks_appended_hops() {
        let mut envelope = sample_envelope();
        assert_eq!(envelope.hop_count(), 0);
        envelope.append_hop("dispatcher", None, Utc::now());
        envelope.append_hop("publisher", Some(Utc::now()), Utc::now());
        assert_eq!(envelope.hop_count(), 2);
        assert_eq!(envelope.hops[0].service, "dispatcher");
    }
}
