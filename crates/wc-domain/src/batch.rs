//! Wire contract for `process_work_batch`, per WC-SPEC §6.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{CausationId, CorrelationId, EventId, InstanceId, MessageId, StreamId};
use crate::rows::{InboxRow, OutboxRow};
use crate::status::{MessageProcessingStatus, PerspectiveProcessingStatus, ReceptorProcessingStatus};

/// Tuning flags passed per-call. Only `SKIP_CLAIM` exists today; the bitset
/// shape leaves room for future flags without a wire break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBatchFlags(u32);

impl WorkBatchFlags {
    pub const SKIP_CLAIM: u32 = 1 << 0;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with(mut self, flag: u32) -> Self {
        self.0 |= flag;
        self
    }

    pub fn has(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxCompletion {
    pub message_id: MessageId,
    pub status: MessageProcessingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxFailure {
    pub message_id: MessageId,
    pub status: MessageProcessingStatus,
    pub error: String,
    pub stack_trace: Option<String>,
    /// Per WC-SPEC §7: a `PermanentTransportError` dead-letters immediately
    /// rather than advancing `retry_count` toward `maxRetries`.
    pub is_permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxCompletion {
    pub message_id: MessageId,
    pub status: MessageProcessingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxFailure {
    pub message_id: MessageId,
    pub status: MessageProcessingStatus,
    pub error: String,
    pub stack_trace: Option<String>,
    /// See [`OutboxFailure::is_permanent`]. `HandlerError`s from perspective
    /// invocation are never permanent; only transport-originated failures are.
    pub is_permanent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorCompletion {
    pub event_id: EventId,
    pub receptor_name: String,
    pub status: ReceptorProcessingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorFailure {
    pub event_id: EventId,
    pub receptor_name: String,
    pub status: ReceptorProcessingStatus,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerspectiveCompletion {
    pub stream_id: StreamId,
    pub perspective_name: String,
    pub last_event_id: EventId,
    pub status: PerspectiveProcessingStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerspectiveFailure {
    pub stream_id: StreamId,
    pub perspective_name: String,
    pub last_event_id: EventId,
    pub status: PerspectiveProcessingStatus,
    pub error: String,
}

/// A new outbox message to insert, per WC-SPEC §6. `is_event` plus the
/// `event_suffix` convention on `message_type` must BOTH hold for an
/// event-store row to be written (WC-SPEC §9 Open Questions, resolved).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOutboxMessage {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub causation_id: Option<CausationId>,
    pub message_type: String,
    pub stream_id: StreamId,
    pub topic: String,
    pub payload_bytes: Vec<u8>,
    pub is_event: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInboxMessage {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub causation_id: Option<CausationId>,
    pub message_type: String,
    pub stream_id: StreamId,
    pub source_topic: String,
    pub payload_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessWorkBatchRequest {
    pub instance_id: InstanceId,
    pub service_name: String,
    pub host_name: String,
    pub process_id: i32,
    pub metadata: HashMap<String, serde_json::Value>,

    pub outbox_completions: Vec<OutboxCompletion>,
    pub outbox_failures: Vec<OutboxFailure>,
    pub inbox_completions: Vec<InboxCompletion>,
    pub inbox_failures: Vec<InboxFailure>,
    pub receptor_completions: Vec<ReceptorCompletion>,
    pub receptor_failures: Vec<ReceptorFailure>,
    pub perspective_completions: Vec<PerspectiveCompletion>,
    pub perspective_failures: Vec<PerspectiveFailure>,

    pub new_outbox_messages: Vec<NewOutboxMessage>,
    pub new_inbox_messages: Vec<NewInboxMessage>,

    pub renew_outbox_lease_ids: Vec<MessageId>,
    pub renew_inbox_lease_ids: Vec<MessageId>,

    pub flags: WorkBatchFlags,
    pub partition_count: u32,
    pub max_partitions_per_instance: u32,
    pub lease_seconds: i64,
    pub stale_threshold_seconds: i64,
    pub max_claim_batch: u32,
}

impl ProcessWorkBatchRequest {
    /// An empty batch (no completions, no new messages) with `SkipClaim`
    /// unset, used as a heartbeat call — WC-SPEC §8 boundary behavior:
    /// "MUST be safe as a no-op."
    pub fn heartbeat(instance_id: InstanceId, service_name: impl Into<String>, host_name: impl Into<String>, process_id: i32) -> Self {
        Self {
            instance_id,
            service_name: service_name.into(),
            host_name: host_name.into(),
            process_id,
            metadata: HashMap::new(),
            outbox_completions: vec![],
            outbox_failures: vec![],
            inbox_completions: vec![],
            inbox_failures: vec![],
            receptor_completions: vec![],
            receptor_failures: vec![],
            perspective_completions: vec![],
            perspective_failures: vec![],
            new_outbox_messages: vec![],
            new_inbox_messages: vec![],
            renew_outbox_lease_ids: vec![],
            renew_inbox_lease_ids: vec![],
            flags: WorkBatchFlags::new(),
            partition_count: 10_000,
            max_partitions_per_instance: 100,
            lease_seconds: 300,
            stale_threshold_seconds: 600,
            max_claim_batch: 100,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outbox_completions.is_empty()
            && self.outbox_failures.is_empty()
            && self.inbox_completions.is_empty()
            && self.inbox_failures.is_empty()
            && self.receptor_completions.is_empty()
            && self.receptor_failures.is_empty()
            && self.perspective_completions.is_empty()
            && self.perspective_failures.is_empty()
            && self.new_outbox_messages.is_empty()
            && self.new_inbox_messages.is_empty()
            && self.renew_outbox_lease_ids.is_empty()
            && self.renew_inbox_lease_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessWorkBatchResponse {
    pub claimed_outbox_messages: Vec<OutboxRow>,
    pub claimed_inbox_messages: Vec<InboxRow>,
    pub assigned_partitions: Vec<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_batch_is_empty() {
        let request = ProcessWorkBatchRequest::heartbeat(InstanceId::new(), "svc", "host", 1);
        assert!(request.is_empty());
    }

    #[test]
    fn flags_roundtrip() {
        let flags = WorkBatchFlags::new().with(WorkBatchFlags::SKIP_CLAIM);
        assert!(flags.has(WorkBatchFlags::SKIP_CLAIM));
        assert!(!WorkBatchFlags::new().has(WorkBatchFlags::SKIP_CLAIM));
    }

    #[test]
    fn non_empty_batch_is_reported_correctly() {
        let mut request = ProcessWorkBatchRequest::heartbeat(InstanceId::new(), "svc", "host", 1);
        request.renew_outbox_lease_ids.push(MessageId::new());
        assert!(!request.is_empty());
    }
}
