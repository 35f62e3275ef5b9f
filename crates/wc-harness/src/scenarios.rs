//! Drives the concrete scenarios from WC-SPEC §8 against [`InMemoryStore`]
//! and reports pass/fail for each, plus the observable detail that failed.

use std::sync::Arc;

use wc_coordinator::{WorkCoordinator, WorkCoordinatorStrategy};
use wc_dispatcher::{routing::ReceptorOutcome, Dispatcher, RoutingTable};
use wc_domain::{
    CoordinatorConfig, InboxCompletion, InstanceId, MessageId, MessageProcessingStatus, NewInboxMessage,
    NewOutboxMessage, OutboxCompletion, ProcessWorkBatchRequest, RowStatus, StrategyKind, StreamId,
};

use crate::fakes::InMemoryStore;

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

fn pass(name: &'static str) -> ScenarioOutcome {
    ScenarioOutcome { name, passed: true, detail: "ok".to_string() }
}

fn fail(name: &'static str, detail: impl Into<String>) -> ScenarioOutcome {
    ScenarioOutcome { name, passed: false, detail: detail.into() }
}

/// Run S1 through S6 in isolation (each gets a fresh store) and return one
/// outcome per scenario, in order.
pub async fn run_all() -> Vec<ScenarioOutcome> {
    vec![s1_command_produces_event().await, s2_publisher_claim_and_complete().await, s3_crash_during_publish().await, s4_duplicate_inbox().await, s5_stream_ordering().await, s6_version_conflict().await]
}

/// S1 — Command produces event.
async fn s1_command_produces_event() -> ScenarioOutcome {
    let name = "S1 command produces event";
    let config = CoordinatorConfig::default();
    let store = Arc::new(InMemoryStore::new(config.clone()));
    let coordinator = Arc::new(WorkCoordinator::new(store.clone(), config.clone()));
    let strategy = Arc::new(WorkCoordinatorStrategy::new(
        coordinator,
        &config,
        StrategyKind::Immediate,
        InstanceId::new(),
        "harness",
        "host",
        1,
    ));

    let mut routes = RoutingTable::new();
    routes.register_receptor(
        "CreateOrder",
        Arc::new(|_message_type, payload_bytes| {
            Box::pin(async move {
                Ok(ReceptorOutcome {
                    message_type: "OrderCreatedEvent".to_string(),
                    stream_id: StreamId::new(),
                    topic: "orders".to_string(),
                    payload_bytes,
                    is_event: true,
                })
            })
        }),
    );
    let dispatcher = Dispatcher::new(routes, strategy);

    let receipt = match dispatcher.send_async("CreateOrder", StreamId::new(), b"{\"customer\":\"C1\",\"total\":9.99}".to_vec(), None, None).await {
        Ok(r) => r,
        Err(error) => return fail(name, format!("send_async failed: {error}")),
    };

    let outbox = store.outbox_snapshot();
    if outbox.len() != 1 {
        return fail(name, format!("expected 1 outbox row, found {}", outbox.len()));
    }
    if outbox[0].message_id != receipt.message_id {
        return fail(name, "outbox row message_id does not match receipt");
    }

    let expected_partition = wc_domain::partition_for(&outbox[0].stream_id, config.partition_count);
    if outbox[0].partition_number != expected_partition {
        return fail(name, "outbox row partition_number is not hash(streamId) mod partitionCount");
    }

    let events = store.event_store_snapshot();
    if events.len() != 1 || events[0].version != 1 || events[0].stream_id != outbox[0].stream_id {
        return fail(name, format!("expected one event_store row at version 1, found {events:?}"));
    }

    pass(name)
}

/// S2 — Publisher claim and complete.
async fn s2_publisher_claim_and_complete() -> ScenarioOutcome {
    let name = "S2 publisher claim and complete";
    let config = CoordinatorConfig::default();
    let store = Arc::new(InMemoryStore::new(config.clone()));
    let coordinator = WorkCoordinator::new(store.clone(), config.clone());

    let instance_id = InstanceId::new();
    let message_id = MessageId::new();
    let stream_id = StreamId::new();

    let mut seed = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    seed.new_outbox_messages.push(NewOutboxMessage {
        message_id,
        correlation_id: Default::default(),
        causation_id: None,
        message_type: "OrderCreatedEvent".to_string(),
        stream_id,
        topic: "orders".to_string(),
        payload_bytes: b"{}".to_vec(),
        is_event: false,
    });
    if let Err(error) = coordinator.process_work_batch(seed).await {
        return fail(name, format!("seed insert failed: {error}"));
    }

    let claim = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    let response = match coordinator.process_work_batch(claim).await {
        Ok(r) => r,
        Err(error) => return fail(name, format!("claim failed: {error}")),
    };
    if response.claimed_outbox_messages.len() != 1 || response.claimed_outbox_messages[0].message_id != message_id {
        return fail(name, "expected the seeded row in claimed_outbox_messages");
    }
    let claimed = &response.claimed_outbox_messages[0];
    if claimed.status != RowStatus::Claimed || claimed.instance_id != Some(instance_id) || claimed.lease_expiry.is_none() {
        return fail(name, "claimed row missing status/instance_id/lease_expiry");
    }

    let mut complete = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    complete.outbox_completions.push(OutboxCompletion { message_id, status: MessageProcessingStatus::Published });
    if let Err(error) = coordinator.process_work_batch(complete).await {
        return fail(name, format!("completion failed: {error}"));
    }

    if store.outbox_snapshot().iter().any(|r| r.message_id == message_id) {
        return fail(name, "row still present after OutboxCompletion");
    }

    pass(name)
}

/// S3 — Crash during publish: another instance reclaims the row once the
/// lease has lapsed. Real time is stood in for with `force_expire_all_leases`.
async fn s3_crash_during_publish() -> ScenarioOutcome {
    let name = "S3 crash during publish";
    let config = CoordinatorConfig::default();
    let store = Arc::new(InMemoryStore::new(config.clone()));
    let coordinator = WorkCoordinator::new(store.clone(), config.clone());

    let i1 = InstanceId::new();
    let i2 = InstanceId::new();
    let message_id = MessageId::new();
    let stream_id = StreamId::new();

    let mut seed = ProcessWorkBatchRequest::heartbeat(i1, "harness", "host", 1);
    seed.new_outbox_messages.push(NewOutboxMessage {
        message_id,
        correlation_id: Default::default(),
        causation_id: None,
        message_type: "OrderCreatedEvent".to_string(),
        stream_id,
        topic: "orders".to_string(),
        payload_bytes: b"{}".to_vec(),
        is_event: false,
    });
    if let Err(error) = coordinator.process_work_batch(seed).await {
        return fail(name, format!("seed insert failed: {error}"));
    }

    let claim = ProcessWorkBatchRequest::heartbeat(i1, "harness", "host", 1);
    if let Err(error) = coordinator.process_work_batch(claim).await {
        return fail(name, format!("initial claim failed: {error}"));
    }

    // I1 dies here without ever flushing a completion.
    store.force_expire_all_leases();

    let reclaim = ProcessWorkBatchRequest::heartbeat(i2, "harness", "host", 1);
    let response = match coordinator.process_work_batch(reclaim).await {
        Ok(r) => r,
        Err(error) => return fail(name, format!("reclaim failed: {error}")),
    };

    if response.claimed_outbox_messages.len() != 1 || response.claimed_outbox_messages[0].message_id != message_id {
        return fail(name, "expected I2 to reclaim the row with the expired lease");
    }
    if response.claimed_outbox_messages[0].instance_id != Some(i2) {
        return fail(name, "reclaimed row is not owned by I2");
    }

    pass(name)
}

/// S4 — Duplicate inbox delivery.
async fn s4_duplicate_inbox() -> ScenarioOutcome {
    let name = "S4 duplicate inbox";
    let config = CoordinatorConfig::default();
    let store = Arc::new(InMemoryStore::new(config.clone()));
    let coordinator = WorkCoordinator::new(store.clone(), config.clone());

    let instance_id = InstanceId::new();
    let message_id = MessageId::new();
    let stream_id = StreamId::new();

    let new_message = NewInboxMessage {
        message_id,
        correlation_id: Default::default(),
        causation_id: None,
        message_type: "OrderCreated".to_string(),
        stream_id,
        source_topic: "orders".to_string(),
        payload_bytes: b"{}".to_vec(),
    };

    let mut first = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    first.new_inbox_messages.push(new_message.clone());
    let response = match coordinator.process_work_batch(first).await {
        Ok(r) => r,
        Err(error) => return fail(name, format!("first delivery failed: {error}")),
    };
    if response.claimed_inbox_messages.len() != 1 {
        return fail(name, "expected the first delivery to be claimed");
    }

    // Perspective runs, action completes the row.
    let mut complete = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    complete.inbox_completions.push(InboxCompletion { message_id, status: MessageProcessingStatus::Completed });
    if let Err(error) = coordinator.process_work_batch(complete).await {
        return fail(name, format!("completion failed: {error}"));
    }

    // Second delivery of the same messageId: a no-op insert, nothing to claim.
    let mut second = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    second.new_inbox_messages.push(new_message);
    let response = match coordinator.process_work_batch(second).await {
        Ok(r) => r,
        Err(error) => return fail(name, format!("second delivery failed: {error}")),
    };
    if !response.claimed_inbox_messages.is_empty() {
        return fail(name, "duplicate delivery must not be claimed again");
    }

    pass(name)
}

/// S5 — Stream ordering: within a stream, strict SequenceOrder; across
/// streams, interleaving is permitted.
async fn s5_stream_ordering() -> ScenarioOutcome {
    let name = "S5 stream ordering";
    let config = CoordinatorConfig::default();
    let store = Arc::new(InMemoryStore::new(config.clone()));
    let coordinator = WorkCoordinator::new(store.clone(), config.clone());
    let instance_id = InstanceId::new();

    let stream_a = StreamId::new();
    let stream_b = StreamId::new();

    let mut seed = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    for _ in 0..3 {
        seed.new_outbox_messages.push(NewOutboxMessage {
            message_id: MessageId::new(),
            correlation_id: Default::default(),
            causation_id: None,
            message_type: "OrderTouched".to_string(),
            stream_id: stream_a,
            topic: "orders".to_string(),
            payload_bytes: b"{}".to_vec(),
            is_event: false,
        });
    }
    for _ in 0..2 {
        seed.new_outbox_messages.push(NewOutboxMessage {
            message_id: MessageId::new(),
            correlation_id: Default::default(),
            causation_id: None,
            message_type: "ShipmentTouched".to_string(),
            stream_id: stream_b,
            topic: "shipments".to_string(),
            payload_bytes: b"{}".to_vec(),
            is_event: false,
        });
    }
    if let Err(error) = coordinator.process_work_batch(seed).await {
        return fail(name, format!("seed insert failed: {error}"));
    }

    let claim = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    let response = match coordinator.process_work_batch(claim).await {
        Ok(r) => r,
        Err(error) => return fail(name, format!("claim failed: {error}")),
    };
    if response.claimed_outbox_messages.len() != 5 {
        return fail(name, format!("expected all 5 rows claimed in one batch, got {}", response.claimed_outbox_messages.len()));
    }

    let processor = wc_coordinator::OrderedStreamProcessor::new(4);
    let delivered: std::sync::Arc<std::sync::Mutex<Vec<(StreamId, i64)>>> = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let delivered_for_closure = delivered.clone();
    processor
        .process(response.claimed_outbox_messages, move |row: wc_domain::OutboxRow| {
            let delivered = delivered_for_closure.clone();
            async move {
                delivered.lock().unwrap().push((row.stream_id, row.sequence_order));
                Ok::<(), wc_domain::WorkCoordinatorError>(())
            }
        })
        .await;

    let delivered = delivered.lock().unwrap();
    let a_order: Vec<i64> = delivered.iter().filter(|(s, _)| *s == stream_a).map(|(_, seq)| *seq).collect();
    let b_order: Vec<i64> = delivered.iter().filter(|(s, _)| *s == stream_b).map(|(_, seq)| *seq).collect();

    if !a_order.windows(2).all(|w| w[0] < w[1]) {
        return fail(name, format!("stream A delivered out of order: {a_order:?}"));
    }
    if !b_order.windows(2).all(|w| w[0] < w[1]) {
        return fail(name, format!("stream B delivered out of order: {b_order:?}"));
    }

    pass(name)
}

/// S6 — Version conflict: a second writer racing to the same
/// `(streamId, version)` loses with `ConcurrencyError` and leaves no trace.
async fn s6_version_conflict() -> ScenarioOutcome {
    let name = "S6 version conflict";
    let config = CoordinatorConfig::default();
    let store = Arc::new(InMemoryStore::new(config.clone()));
    let coordinator = WorkCoordinator::new(store.clone(), config.clone());
    let instance_id = InstanceId::new();
    let stream_id = StreamId::new();

    // A concurrent writer commits version 1 through a separate racing
    // transaction, ahead of this instance's batch.
    store.seed_conflicting_event_version(stream_id, 1);

    let mut batch = ProcessWorkBatchRequest::heartbeat(instance_id, "harness", "host", 1);
    batch.new_outbox_messages.push(NewOutboxMessage {
        message_id: MessageId::new(),
        correlation_id: Default::default(),
        causation_id: None,
        message_type: "OrderCreatedEvent".to_string(),
        stream_id,
        topic: "orders".to_string(),
        payload_bytes: b"{}".to_vec(),
        is_event: true,
    });
    let result = coordinator.process_work_batch(batch).await;

    match result {
        Ok(_) => return fail(name, "expected the racing writer to be rejected with a concurrency error"),
        Err(wc_domain::WorkCoordinatorError::Concurrency { .. }) => {}
        Err(error) => return fail(name, format!("expected ConcurrencyError, got {error}")),
    }

    if !store.outbox_snapshot().is_empty() {
        return fail(name, "losing batch left an outbox row behind; commit was not atomic");
    }
    let events = store.event_store_snapshot();
    if events.len() != 1 || events[0].version != 1 {
        return fail(name, format!("expected only the winning version=1 row to survive, found {events:?}"));
    }

    pass(name)
}
