//! ConsumerWorker (C6), per WC-SPEC §4.6: transport-facing loop that queues
//! received messages into the inbox for dedup and, on genuinely new
//! messages, drives perspectives through the Ordered Stream Processor.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use wc_coordinator::{OrderedStreamProcessor, WorkCoordinator, WorkCoordinatorStrategy};
use wc_dispatcher::{EventMessage, RoutingTable};
use wc_domain::{
    CoordinatorConfig, InboxCompletion, InboxFailure, InboxRow, InstanceId, MessageProcessingStatus,
    NewInboxMessage, StrategyKind, WorkCoordinatorError,
};
use wc_ports::{ReceiveStream, Store, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

pub struct ConsumerWorker<S: Store, T: Transport> {
    coordinator: Arc<WorkCoordinator<S>>,
    config: CoordinatorConfig,
    transport: Arc<T>,
    routes: Arc<RoutingTable>,
    stream_processor: OrderedStreamProcessor,
    instance_id: InstanceId,
    service_name: String,
    host_name: String,
    process_id: i32,
    state: tokio::sync::RwLock<WorkerState>,
}

impl<S: Store + 'static, T: Transport + 'static> ConsumerWorker<S, T> {
    pub fn new(
        coordinator: Arc<WorkCoordinator<S>>,
        config: CoordinatorConfig,
        transport: Arc<T>,
        routes: Arc<RoutingTable>,
        instance_id: InstanceId,
        service_name: impl Into<String>,
        host_name: impl Into<String>,
        process_id: i32,
    ) -> Self {
        let max_stream_parallelism = config.max_stream_parallelism;
        Self {
            coordinator,
            config,
            transport,
            routes,
            stream_processor: OrderedStreamProcessor::new(max_stream_parallelism),
            instance_id,
            service_name: service_name.into(),
            host_name: host_name.into(),
            process_id,
            state: tokio::sync::RwLock::new(WorkerState::Starting),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    pub async fn stop(&self) {
        self.set_state(WorkerState::Draining).await;
    }

    /// Run the receive loop for one `topic` until `stop()` is called. A
    /// service with several inbound topics runs one of these per topic.
    #[instrument(skip(self))]
    pub async fn run(&self, topic: &str) -> Result<(), WorkCoordinatorError> {
        self.set_state(WorkerState::Running).await;
        let mut subscription = self.transport.receive(topic).await?;
        info!(%topic, "consumer worker entering receive loop");

        while self.state().await == WorkerState::Running {
            let Some(received) = subscription.next().await else {
                continue;
            };

            let message_id_str = received.envelope.message_id.to_string();
            if let Err(error) = self.handle_one(received).await {
                warn!(%error, message_id = %message_id_str, "failed to process received message, not acknowledging");
                continue;
            }
            if let Err(error) = self.transport.ack(&message_id_str).await {
                warn!(%error, message_id = %message_id_str, "ack failed");
            }
        }

        self.set_state(WorkerState::Stopped).await;
        info!(%topic, "consumer worker stopped");
        Ok(())
    }

    /// Drive one external message through inbox dedup and, if new, through
    /// perspective invocation, per WC-SPEC §4.6 steps 1-5. Returns only after
    /// the scope's flush has committed (step 6: acknowledge after commit).
    async fn handle_one(&self, received: wc_ports::ReceivedMessage) -> Result<(), WorkCoordinatorError> {
        let strategy = WorkCoordinatorStrategy::new(
            self.coordinator.clone(),
            &self.config,
            StrategyKind::Scoped,
            self.instance_id,
            &self.service_name,
            &self.host_name,
            self.process_id,
        );

        let envelope = &received.envelope;
        strategy
            .enqueue_new_inbox_message(NewInboxMessage {
                message_id: envelope.message_id,
                correlation_id: envelope.correlation_id,
                causation_id: envelope.causation_id,
                message_type: envelope.message_type.clone(),
                stream_id: envelope.stream_id,
                source_topic: received.source_topic.clone(),
                payload_bytes: received.payload_bytes.clone(),
            })
            .await?;

        let response = strategy.flush_and_claim().await?;

        if response.claimed_inbox_messages.is_empty() {
            // Duplicate: some prior delivery already owns this message_id.
            return Ok(());
        }

        let routes = self.routes.clone();
        let strategy = Arc::new(strategy);
        let outcomes = self
            .stream_processor
            .process(response.claimed_inbox_messages, move |row: InboxRow| {
                let routes = routes.clone();
                let strategy = strategy.clone();
                async move { invoke_perspectives_for_row(routes.as_ref(), strategy.as_ref(), row).await }
            })
            .await;

        let any_failed = outcomes.iter().any(|o| o.result.is_err());
        if any_failed {
            Err(WorkCoordinatorError::Handler {
                reason: "one or more inbox rows failed perspective invocation".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// Run every perspective registered for this row's event type in parallel,
/// per WC-SPEC §4.6 step 4: the action resolves only once all perspectives
/// have succeeded, else it fails. Each perspective's outcome is recorded
/// individually against its own `(StreamId, PerspectiveName)` checkpoint;
/// the inbox row itself gets one aggregate completion or failure.
async fn invoke_perspectives_for_row<S: Store>(
    routes: &RoutingTable,
    strategy: &WorkCoordinatorStrategy<S>,
    row: InboxRow,
) -> Result<(), WorkCoordinatorError> {
    let event = EventMessage {
        event_type: row.message_type.clone(),
        stream_id: row.stream_id,
        sequence_number: row.sequence_order,
        payload_bytes: row.payload_bytes.clone(),
    };

    // WC-SPEC §3: EventId on the consumer side is the MessageId the
    // producer's outbox row was keyed by — the same id this inbox row
    // carries, since it is not re-minted in transit.
    let last_event_id = wc_domain::EventId::from_ulid(row.message_id.as_ulid());

    let perspectives = routes.perspectives_for(&event.event_type);
    let results = futures::future::join_all(perspectives.into_iter().map(|(name, perspective)| {
        let event = event.clone();
        async move { (name, perspective(event).await) }
    }))
    .await;

    let mut failed_names = Vec::new();
    for (name, result) in results {
        match result {
            Ok(()) => {
                strategy
                    .enqueue_perspective_completion(wc_domain::PerspectiveCompletion {
                        stream_id: row.stream_id,
                        perspective_name: name,
                        last_event_id,
                        status: wc_domain::PerspectiveProcessingStatus::UpToDate,
                    })
                    .await?;
            }
            Err(error) => {
                strategy
                    .enqueue_perspective_failure(wc_domain::PerspectiveFailure {
                        stream_id: row.stream_id,
                        perspective_name: name.clone(),
                        last_event_id,
                        status: wc_domain::PerspectiveProcessingStatus::Failed,
                        error: error.to_string(),
                    })
                    .await?;
                failed_names.push(format!("{name}: {error}"));
            }
        }
    }

    if failed_names.is_empty() {
        strategy
            .enqueue_inbox_completion(InboxCompletion {
                message_id: row.message_id,
                status: MessageProcessingStatus::Completed,
            })
            .await?;
        Ok(())
    } else {
        let reason = failed_names.join("; ");
        strategy
            .enqueue_inbox_failure(InboxFailure {
                message_id: row.message_id,
                status: MessageProcessingStatus::Failed,
                error: reason.clone(),
                stack_trace: None,
                is_permanent: false,
            })
            .await?;
        Err(WorkCoordinatorError::Handler { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use wc_domain::{CorrelationId, MessageEnvelope, MessageId, ProcessWorkBatchRequest, ProcessWorkBatchResponse, RowStatus, StreamId};
    use wc_ports::{PublishOutcome, ReceivedMessage};

    struct FakeStore {
        rows: StdMutex<Vec<InboxRow>>,
    }

    impl Store for FakeStore {
        async fn process_work_batch(
            &self,
            request: ProcessWorkBatchRequest,
        ) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
            let mut rows = self.rows.lock().unwrap();
            let mut claimed = Vec::new();

            for message in request.new_inbox_messages {
                if rows.iter().any(|r| r.message_id == message.message_id) {
                    continue;
                }
                let row = InboxRow {
                    message_id: message.message_id,
                    correlation_id: message.correlation_id,
                    causation_id: message.causation_id,
                    message_type: message.message_type,
                    stream_id: message.stream_id,
                    partition_number: 0,
                    sequence_order: rows.len() as i64 + 1,
                    source_topic: message.source_topic,
                    payload_bytes: message.payload_bytes,
                    status: RowStatus::Claimed,
                    instance_id: Some(request.instance_id),
                    lease_expiry: None,
                    retry_count: 0,
                    last_error: None,
                    received_at: chrono::Utc::now(),
                };
                rows.push(row.clone());
                claimed.push(row);
            }

            for completion in request.inbox_completions {
                rows.retain(|r| r.message_id != completion.message_id);
            }

            Ok(ProcessWorkBatchResponse {
                claimed_outbox_messages: vec![],
                claimed_inbox_messages: claimed,
                assigned_partitions: vec![0],
            })
        }
    }

    struct FakeTransport {
        acked: StdMutex<Vec<String>>,
    }

    impl Transport for FakeTransport {
        type Subscription = NoopStream;

        async fn publish(
            &self,
            _topic: &str,
            _message_id: &str,
            _payload_bytes: &[u8],
            _envelope: &MessageEnvelope,
        ) -> Result<PublishOutcome, WorkCoordinatorError> {
            Ok(PublishOutcome::Delivered)
        }

        async fn receive(&self, _topic: &str) -> Result<Self::Subscription, WorkCoordinatorError> {
            Ok(NoopStream)
        }

        async fn ack(&self, message_id: &str) -> Result<(), WorkCoordinatorError> {
            self.acked.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn nack(&self, _message_id: &str) -> Result<(), WorkCoordinatorError> {
            Ok(())
        }
    }

    struct NoopStream;
    impl ReceiveStream for NoopStream {
        async fn next(&mut self) -> Option<ReceivedMessage> {
            None
        }
    }

    fn received_message(message_id: MessageId, stream_id: StreamId, message_type: &str) -> ReceivedMessage {
        ReceivedMessage {
            envelope: MessageEnvelope {
                message_id,
                correlation_id: CorrelationId::new(),
                causation_id: None,
                message_type: message_type.to_string(),
                stream_id,
                partition_number: 0,
                sequence_order: 1,
                hops: vec![],
                created_at: chrono::Utc::now(),
            },
            source_topic: "orders".to_string(),
            payload_bytes: b"{}".to_vec(),
        }
    }

    fn worker(store: Arc<FakeStore>, transport: Arc<FakeTransport>, routes: RoutingTable) -> ConsumerWorker<FakeStore, FakeTransport> {
        let coordinator = Arc::new(WorkCoordinator::new(store, CoordinatorConfig::default()));
        ConsumerWorker::new(
            coordinator,
            CoordinatorConfig::default(),
            transport,
            Arc::new(routes),
            InstanceId::new(),
            "svc",
            "host",
            1,
        )
    }

    #[tokio::test]
    async fn new_message_invokes_perspectives_and_acknowledges() {
        let store = Arc::new(FakeStore { rows: StdMutex::new(vec![]) });
        let transport = Arc::new(FakeTransport { acked: StdMutex::new(vec![]) });
        let calls = Arc::new(AtomicUsize::new(0));

        let mut routes = RoutingTable::new();
        let calls_clone = calls.clone();
        routes.register_perspective(
            "OrderCreated",
            "OrderSummary",
            Arc::new(move |_event| {
                let calls_clone = calls_clone.clone();
                Box::pin(async move {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        let worker = worker(store, transport.clone(), routes);
        let received = received_message(MessageId::new(), StreamId::new(), "OrderCreated");
        let message_id_str = received.envelope.message_id.to_string();

        worker.handle_one(received).await.unwrap();
        worker.transport.ack(&message_id_str).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.acked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_message_id_does_not_invoke_perspectives_again() {
        let store = Arc::new(FakeStore { rows: StdMutex::new(vec![]) });
        let transport = Arc::new(FakeTransport { acked: StdMutex::new(vec![]) });
        let calls = Arc::new(AtomicUsize::new(0));

        // Deliberately failing, so the completion never deletes the row and
        // a second delivery of the same message_id has to hit the Store's
        // `ON CONFLICT (message_id) DO NOTHING` dedup path instead.
        let mut routes = RoutingTable::new();
        let calls_clone = calls.clone();
        routes.register_perspective(
            "OrderCreated",
            "OrderSummary",
            Arc::new(move |_event| {
                let calls_clone = calls_clone.clone();
                Box::pin(async move {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    Err(WorkCoordinatorError::Handler { reason: "boom".to_string() })
                })
            }),
        );

        let worker = worker(store, transport, routes);
        let message_id = MessageId::new();
        let stream_id = StreamId::new();

        let first = worker.handle_one(received_message(message_id, stream_id, "OrderCreated")).await;
        assert!(first.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = worker.handle_one(received_message(message_id, stream_id, "OrderCreated")).await;
        assert!(second.is_ok(), "duplicate delivery must not surface as a processing error");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "perspective must not run twice for the same message_id");
    }
}
