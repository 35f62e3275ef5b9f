//! In-memory [`Store`] fake, mirroring `wc-postgres`'s transaction semantics
//! (claim ordering, dead-letter policy, version-conflict detection) without
//! a database, so the scenario harness can drive the coordinator logic
//! directly.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use wc_domain::{
    aggregate_type_from_message_type, partition_for, CoordinatorConfig, DeadLetterPolicy, EventId,
    EventStoreRow, InboxRow, InstanceId, MessageId, PerspectiveCheckpointRow, ProcessWorkBatchRequest,
    ProcessWorkBatchResponse, RowStatus, StreamId, WorkBatchFlags, WorkCoordinatorError,
};
use wc_ports::Store;

#[derive(Default, Clone)]
struct State {
    outbox: Vec<OutboxEntry>,
    inbox: Vec<InboxEntry>,
    event_store: Vec<EventStoreRow>,
    stream_sequence: HashMap<StreamId, i64>,
    stream_event_version: HashMap<StreamId, i64>,
    receptor_processing: HashMap<(EventId, String), wc_domain::ReceptorProcessingStatus>,
    perspective_checkpoints: HashMap<(StreamId, String), PerspectiveCheckpointRow>,
    partition_leases: HashMap<u32, (InstanceId, DateTime<Utc>)>,
    dead_letter_outbox: Vec<OutboxEntry>,
    dead_letter_inbox: Vec<InboxEntry>,
}

#[derive(Clone)]
struct OutboxEntry {
    row: wc_domain::OutboxRow,
}

#[derive(Clone)]
struct InboxEntry {
    row: InboxRow,
}

/// An in-process stand-in for `PostgresStore`. All state lives behind a
/// single mutex; `process_work_batch` holds it for the whole call, the same
/// atomicity a real transaction gives the Postgres adapter.
pub struct InMemoryStore {
    config: CoordinatorConfig,
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config, state: Mutex::new(State::default()) }
    }

    /// Test-only time travel: push every claimed row's lease into the past,
    /// standing in for waiting out `leaseSeconds` in real time (WC-SPEC §8
    /// scenario S3).
    pub fn force_expire_all_leases(&self) {
        let expired = Utc::now() - ChronoDuration::seconds(1);
        let mut state = self.state.lock().unwrap();
        for entry in state.outbox.iter_mut() {
            if entry.row.status == RowStatus::Claimed {
                entry.row.lease_expiry = Some(expired);
            }
        }
        for entry in state.inbox.iter_mut() {
            if entry.row.status == RowStatus::Claimed {
                entry.row.lease_expiry = Some(expired);
            }
        }
    }

    /// Test-only: seed an event-store row at `version` without reserving it
    /// through the stream's event-version counter, standing in for a
    /// concurrent writer that committed that version through a separate,
    /// racing transaction (WC-SPEC §8 scenario S6). The next ordinary writer
    /// for `stream_id` still starts from the stream's untouched counter, so
    /// it computes the same version and collides.
    pub fn seed_conflicting_event_version(&self, stream_id: StreamId, version: i64) {
        let mut state = self.state.lock().unwrap();
        state.event_store.push(EventStoreRow {
            event_id: EventId::new(),
            stream_id,
            aggregate_type: "Order".to_string(),
            version,
            global_sequence: state.event_store.len() as i64 + 1,
            payload_bytes: b"{}".to_vec(),
            created_at: Utc::now(),
        });
    }

    /// Snapshot of the current outbox rows, for scenario assertions.
    pub fn outbox_snapshot(&self) -> Vec<wc_domain::OutboxRow> {
        self.state.lock().unwrap().outbox.iter().map(|e| e.row.clone()).collect()
    }

    /// Snapshot of the current inbox rows, for scenario assertions.
    pub fn inbox_snapshot(&self) -> Vec<InboxRow> {
        self.state.lock().unwrap().inbox.iter().map(|e| e.row.clone()).collect()
    }

    /// Snapshot of the event store, for scenario assertions.
    pub fn event_store_snapshot(&self) -> Vec<EventStoreRow> {
        self.state.lock().unwrap().event_store.clone()
    }

    /// Reserve the next claim-ordering `sequence_order` for a stream. Shared
    /// by every inbox and outbox row, event-bearing or not, so it advances
    /// on every call — unlike the event-version counter, which only moves
    /// for an actual event-store insert (see `reserve_event_version`).
    fn reserve_sequence_slot(state: &mut State, stream_id: &StreamId) -> i64 {
        let entry = state.stream_sequence.entry(*stream_id).or_insert(1);
        let current = *entry;
        *entry += 1;
        current
    }

    /// Reserve the next event version for a stream, independent of
    /// `sequence_order`, so a stream mixing event and non-event traffic
    /// still gets contiguous 1..N versions.
    fn reserve_event_version(state: &mut State, stream_id: &StreamId) -> i64 {
        let entry = state.stream_event_version.entry(*stream_id).or_insert(1);
        let current = *entry;
        *entry += 1;
        current
    }

    fn dead_letter_outbox_row(&self, state: &mut State, message_id: MessageId, error: &str) {
        if let Some(pos) = state.outbox.iter().position(|e| e.row.message_id == message_id) {
            let mut entry = state.outbox.remove(pos);
            entry.row.last_error = Some(error.to_string());
            match self.config.dead_letter_policy {
                DeadLetterPolicy::MarkTerminal => {
                    entry.row.status = RowStatus::DeadLettered;
                    entry.row.instance_id = None;
                    entry.row.lease_expiry = None;
                    state.outbox.push(entry);
                }
                DeadLetterPolicy::MoveTable => state.dead_letter_outbox.push(entry),
            }
        }
    }

    fn dead_letter_inbox_row(&self, state: &mut State, message_id: MessageId, error: &str) {
        if let Some(pos) = state.inbox.iter().position(|e| e.row.message_id == message_id) {
            let mut entry = state.inbox.remove(pos);
            entry.row.last_error = Some(error.to_string());
            match self.config.dead_letter_policy {
                DeadLetterPolicy::MarkTerminal => {
                    entry.row.status = RowStatus::DeadLettered;
                    entry.row.instance_id = None;
                    entry.row.lease_expiry = None;
                    state.inbox.push(entry);
                }
                DeadLetterPolicy::MoveTable => state.dead_letter_inbox.push(entry),
            }
        }
    }

    fn assign_partitions(&self, state: &mut State, instance_id: InstanceId, now: DateTime<Utc>) -> Vec<u32> {
        let lease_expiry = now + ChronoDuration::seconds(self.config.stale_threshold_seconds.max(1));

        let mut owned: Vec<u32> = state
            .partition_leases
            .iter()
            .filter(|(_, (owner, expiry))| *owner == instance_id && *expiry > now)
            .map(|(partition, _)| *partition)
            .collect();

        let taken: std::collections::HashSet<u32> = state
            .partition_leases
            .iter()
            .filter(|(_, (owner, expiry))| *owner != instance_id && *expiry > now)
            .map(|(partition, _)| *partition)
            .collect();

        let wanted = self.config.max_partitions_per_instance as usize;
        let mut needed = wanted.saturating_sub(owned.len());

        if needed > 0 {
            for candidate in 0..self.config.partition_count {
                if needed == 0 {
                    break;
                }
                if taken.contains(&candidate) || owned.contains(&candidate) {
                    continue;
                }
                state.partition_leases.insert(candidate, (instance_id, lease_expiry));
                owned.push(candidate);
                needed -= 1;
            }
        }

        for partition in &owned {
            state.partition_leases.insert(*partition, (instance_id, lease_expiry));
        }

        owned.sort_unstable();
        owned.dedup();
        owned
    }
}

impl Store for InMemoryStore {
    async fn process_work_batch(
        &self,
        request: ProcessWorkBatchRequest,
    ) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
        let now = Utc::now();
        // Stage mutations against a private clone and only swap it into the
        // shared state on success, the same all-or-nothing commit a real
        // transaction gives the Postgres adapter (WC-SPEC §8 S6: a losing
        // writer's batch leaves no persisted side effects).
        let mut state = self.state.lock().unwrap().clone();

        for completion in &request.outbox_completions {
            state.outbox.retain(|e| e.row.message_id != completion.message_id);
        }

        for failure in &request.outbox_failures {
            let retry_count = state
                .outbox
                .iter()
                .find(|e| e.row.message_id == failure.message_id)
                .map(|e| e.row.retry_count)
                .unwrap_or(0);
            let next_retry_count = retry_count + 1;
            if failure.is_permanent || next_retry_count as u32 >= self.config.max_retries {
                self.dead_letter_outbox_row(&mut state, failure.message_id, &failure.error);
            } else if let Some(entry) = state.outbox.iter_mut().find(|e| e.row.message_id == failure.message_id) {
                entry.row.status = RowStatus::Stored;
                entry.row.retry_count = next_retry_count;
                entry.row.last_error = Some(failure.error.clone());
                entry.row.instance_id = None;
                entry.row.lease_expiry = None;
            }
        }

        for message in &request.new_inbox_messages {
            if state.inbox.iter().any(|e| e.row.message_id == message.message_id) {
                continue;
            }
            let sequence_order = Self::reserve_sequence_slot(&mut state, &message.stream_id);
            let partition_number = partition_for(&message.stream_id, self.config.partition_count);
            state.inbox.push(InboxEntry {
                row: InboxRow {
                    message_id: message.message_id,
                    correlation_id: message.correlation_id,
                    causation_id: message.causation_id,
                    message_type: message.message_type.clone(),
                    stream_id: message.stream_id,
                    partition_number,
                    sequence_order,
                    source_topic: message.source_topic.clone(),
                    payload_bytes: message.payload_bytes.clone(),
                    status: RowStatus::Stored,
                    instance_id: None,
                    lease_expiry: None,
                    retry_count: 0,
                    last_error: None,
                    received_at: now,
                },
            });
        }

        for completion in &request.inbox_completions {
            state.inbox.retain(|e| e.row.message_id != completion.message_id);
        }

        for failure in &request.inbox_failures {
            let retry_count = state
                .inbox
                .iter()
                .find(|e| e.row.message_id == failure.message_id)
                .map(|e| e.row.retry_count)
                .unwrap_or(0);
            let next_retry_count = retry_count + 1;
            if failure.is_permanent || next_retry_count as u32 >= self.config.max_retries {
                self.dead_letter_inbox_row(&mut state, failure.message_id, &failure.error);
            } else if let Some(entry) = state.inbox.iter_mut().find(|e| e.row.message_id == failure.message_id) {
                entry.row.status = RowStatus::Stored;
                entry.row.retry_count = next_retry_count;
                entry.row.last_error = Some(failure.error.clone());
                entry.row.instance_id = None;
                entry.row.lease_expiry = None;
            }
        }

        for message in &request.new_outbox_messages {
            if state.outbox.iter().any(|e| e.row.message_id == message.message_id) {
                continue;
            }
            let sequence_order = Self::reserve_sequence_slot(&mut state, &message.stream_id);
            let partition_number = partition_for(&message.stream_id, self.config.partition_count);

            state.outbox.push(OutboxEntry {
                row: wc_domain::OutboxRow {
                    message_id: message.message_id,
                    correlation_id: message.correlation_id,
                    causation_id: message.causation_id,
                    message_type: message.message_type.clone(),
                    stream_id: message.stream_id,
                    partition_number,
                    sequence_order,
                    topic: message.topic.clone(),
                    payload_bytes: message.payload_bytes.clone(),
                    status: RowStatus::Stored,
                    instance_id: None,
                    lease_expiry: None,
                    retry_count: 0,
                    last_error: None,
                    created_at: now,
                },
            });

            let is_event_naming = message.message_type.ends_with(self.config.event_suffix.as_str());
            if message.is_event && is_event_naming {
                let event_id = EventId::from_ulid(message.message_id.as_ulid());
                let aggregate_type = aggregate_type_from_message_type(&message.message_type, &self.config.event_suffix);
                let event_version = Self::reserve_event_version(&mut state, &message.stream_id);

                let conflict = state
                    .event_store
                    .iter()
                    .any(|e| e.stream_id == message.stream_id && e.version == event_version);
                if conflict {
                    return Err(WorkCoordinatorError::Concurrency {
                        stream_id: message.stream_id.to_string(),
                        expected: event_version,
                        actual: event_version,
                    });
                }

                state.event_store.push(EventStoreRow {
                    event_id,
                    stream_id: message.stream_id,
                    aggregate_type,
                    version: event_version,
                    global_sequence: state.event_store.len() as i64 + 1,
                    payload_bytes: message.payload_bytes.clone(),
                    created_at: now,
                });
            }
        }

        for completion in &request.receptor_completions {
            state
                .receptor_processing
                .insert((completion.event_id, completion.receptor_name.clone()), completion.status);
        }
        for failure in &request.receptor_failures {
            state
                .receptor_processing
                .insert((failure.event_id, failure.receptor_name.clone()), failure.status);
        }

        for completion in &request.perspective_completions {
            let candidate_sequence = state
                .event_store
                .iter()
                .find(|e| e.event_id == completion.last_event_id)
                .map(|e| e.version)
                .unwrap_or(0);

            let key = (completion.stream_id, completion.perspective_name.clone());
            let may_advance = state.perspective_checkpoints.get(&key).map(|c| c.may_advance_to(candidate_sequence)).unwrap_or(true);
            if may_advance {
                state.perspective_checkpoints.insert(
                    key,
                    PerspectiveCheckpointRow {
                        stream_id: completion.stream_id,
                        perspective_name: completion.perspective_name.clone(),
                        last_event_id: completion.last_event_id,
                        last_sequence_number: candidate_sequence,
                        status: completion.status,
                        updated_at: now,
                    },
                );
            }
        }
        for failure in &request.perspective_failures {
            let key = (failure.stream_id, failure.perspective_name.clone());
            let last_sequence_number = state.perspective_checkpoints.get(&key).map(|c| c.last_sequence_number).unwrap_or(0);
            state.perspective_checkpoints.insert(
                key,
                PerspectiveCheckpointRow {
                    stream_id: failure.stream_id,
                    perspective_name: failure.perspective_name.clone(),
                    last_event_id: failure.last_event_id,
                    last_sequence_number,
                    status: failure.status,
                    updated_at: now,
                },
            );
        }

        let lease_expiry = now + ChronoDuration::seconds(request.lease_seconds.max(1));
        for message_id in &request.renew_outbox_lease_ids {
            if let Some(entry) = state
                .outbox
                .iter_mut()
                .find(|e| e.row.message_id == *message_id && e.row.instance_id == Some(request.instance_id) && e.row.status == RowStatus::Claimed)
            {
                entry.row.lease_expiry = Some(lease_expiry);
            }
        }
        for message_id in &request.renew_inbox_lease_ids {
            if let Some(entry) = state
                .inbox
                .iter_mut()
                .find(|e| e.row.message_id == *message_id && e.row.instance_id == Some(request.instance_id) && e.row.status == RowStatus::Claimed)
            {
                entry.row.lease_expiry = Some(lease_expiry);
            }
        }

        let assigned_partitions = self.assign_partitions(&mut state, request.instance_id, now);

        if request.flags.has(WorkBatchFlags::SKIP_CLAIM) {
            *self.state.lock().unwrap() = state;
            return Ok(ProcessWorkBatchResponse {
                claimed_outbox_messages: vec![],
                claimed_inbox_messages: vec![],
                assigned_partitions,
            });
        }

        // Reclaim expired leases back to Stored before claiming, mirroring
        // the Postgres adapter's `WHERE status = Stored` claim predicate:
        // a Claimed row past its lease is eligible again without an
        // explicit reclaim step.
        for entry in state.outbox.iter_mut() {
            if entry.row.status == RowStatus::Claimed && entry.row.lease_expiry.map(|e| e <= now).unwrap_or(false) {
                entry.row.status = RowStatus::Stored;
                entry.row.instance_id = None;
                entry.row.lease_expiry = None;
            }
        }
        for entry in state.inbox.iter_mut() {
            if entry.row.status == RowStatus::Claimed && entry.row.lease_expiry.map(|e| e <= now).unwrap_or(false) {
                entry.row.status = RowStatus::Stored;
                entry.row.instance_id = None;
                entry.row.lease_expiry = None;
            }
        }

        let claim_lease_expiry = now + ChronoDuration::seconds(request.lease_seconds.max(1));
        let limit = request.max_claim_batch as usize;

        let mut eligible_outbox: Vec<usize> = state
            .outbox
            .iter()
            .enumerate()
            .filter(|(_, e)| e.row.status == RowStatus::Stored && assigned_partitions.contains(&e.row.partition_number))
            .map(|(i, _)| i)
            .collect();
        eligible_outbox.sort_by_key(|&i| state.outbox[i].row.sequence_order);
        eligible_outbox.truncate(limit);

        let mut claimed_outbox_messages = Vec::new();
        for i in &eligible_outbox {
            let entry = &mut state.outbox[*i];
            entry.row.status = RowStatus::Claimed;
            entry.row.instance_id = Some(request.instance_id);
            entry.row.lease_expiry = Some(claim_lease_expiry);
            claimed_outbox_messages.push(entry.row.clone());
        }

        let mut eligible_inbox: Vec<usize> = state
            .inbox
            .iter()
            .enumerate()
            .filter(|(_, e)| e.row.status == RowStatus::Stored && assigned_partitions.contains(&e.row.partition_number))
            .map(|(i, _)| i)
            .collect();
        eligible_inbox.sort_by_key(|&i| state.inbox[i].row.sequence_order);
        eligible_inbox.truncate(limit);

        let mut claimed_inbox_messages = Vec::new();
        for i in &eligible_inbox {
            let entry = &mut state.inbox[*i];
            entry.row.status = RowStatus::Claimed;
            entry.row.instance_id = Some(request.instance_id);
            entry.row.lease_expiry = Some(claim_lease_expiry);
            claimed_inbox_messages.push(entry.row.clone());
        }

        *self.state.lock().unwrap() = state;

        Ok(ProcessWorkBatchResponse {
            claimed_outbox_messages,
            claimed_inbox_messages,
            assigned_partitions,
        })
    }
}
