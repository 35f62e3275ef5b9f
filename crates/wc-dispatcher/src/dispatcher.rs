//! Dispatcher (C7): in-process entry points used by application code, per
//! WC-SPEC §4.7.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::de::DeserializeOwned;
use tracing::instrument;

use wc_coordinator::WorkCoordinatorStrategy;
use wc_domain::{CausationId, CorrelationId, MessageId, NewOutboxMessage, StreamId, WorkCoordinatorError};
use wc_ports::Store;

use crate::routing::{EventMessage, RoutingTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Accepted,
    Rejected,
}

/// Receipt returned by [`Dispatcher::send_async`], per WC-SPEC §4.7.
/// `Status = Accepted` means the outbox row was durably enqueued after the
/// next flush, not that it has been delivered.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub message_id: MessageId,
    pub correlation_id: CorrelationId,
    pub timestamp: DateTime<Utc>,
    pub destination: String,
    pub status: DispatchStatus,
}

pub struct Dispatcher<S: Store> {
    routes: RoutingTable,
    strategy: Arc<WorkCoordinatorStrategy<S>>,
}

impl<S: Store + 'static> Dispatcher<S> {
    pub fn new(routes: RoutingTable, strategy: Arc<WorkCoordinatorStrategy<S>>) -> Self {
        Self { routes, strategy }
    }

    /// Invoke the local receptor for `message_type`, durably enqueue its
    /// outcome as an outbox row, and return a receipt once the enqueue has
    /// been accepted by the Strategy (not necessarily flushed yet, unless
    /// the Strategy variant is `Immediate`).
    #[instrument(skip(self, payload_bytes), fields(%message_type))]
    pub async fn send_async(
        &self,
        message_type: &str,
        stream_id: StreamId,
        payload_bytes: Vec<u8>,
        correlation_id: Option<CorrelationId>,
        causation_id: Option<CausationId>,
    ) -> Result<DeliveryReceipt, WorkCoordinatorError> {
        let correlation_id = correlation_id.unwrap_or_default();
        let message_id = MessageId::new();

        let receptor = self.routes.receptor_for(message_type).ok_or_else(|| WorkCoordinatorError::Validation {
            reason: format!("no receptor registered for message type {message_type}"),
        })?;

        let outcome = receptor(message_type.to_string(), payload_bytes).await?;

        let new_message = NewOutboxMessage {
            message_id,
            correlation_id,
            causation_id,
            message_type: outcome.message_type,
            stream_id: outcome.stream_id,
            topic: outcome.topic.clone(),
            payload_bytes: outcome.payload_bytes,
            is_event: outcome.is_event,
        };

        self.strategy.enqueue_new_outbox_message(new_message).await?;
        // WC-SPEC §4.7: Accepted means durably enqueued after a flush, so a
        // Scoped strategy below threshold or an Interval strategy must still
        // flush here rather than wait for the enqueue's own maybe_flush.
        self.strategy.flush().await?;

        Ok(DeliveryReceipt {
            message_id,
            correlation_id,
            timestamp: Utc::now(),
            destination: outcome.topic,
            status: DispatchStatus::Accepted,
        })
    }

    /// Invoke the receptor synchronously in-process with no envelope
    /// overhead and no outbox write, for hot paths that need neither
    /// fan-out nor durability.
    #[instrument(skip(self, payload_bytes), fields(%message_type))]
    pub async fn local_invoke_async<T: DeserializeOwned>(
        &self,
        message_type: &str,
        payload_bytes: Vec<u8>,
    ) -> Result<T, WorkCoordinatorError> {
        let receptor = self.routes.receptor_for(message_type).ok_or_else(|| WorkCoordinatorError::Validation {
            reason: format!("no receptor registered for message type {message_type}"),
        })?;

        let outcome = receptor(message_type.to_string(), payload_bytes).await?;

        serde_json::from_slice(&outcome.payload_bytes).map_err(|e| WorkCoordinatorError::Validation {
            reason: format!("receptor result does not match requested type: {e}"),
        })
    }

    /// Fan out to every in-process perspective registered for the event's
    /// type. Runs in parallel; any handler error is aggregated and reported
    /// as a single failure, per WC-SPEC §4.7.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, stream_id = %event.stream_id))]
    pub async fn publish_async(&self, event: EventMessage) -> Result<(), WorkCoordinatorError> {
        let perspectives = self.routes.perspectives_for(&event.event_type);
        if perspectives.is_empty() {
            return Ok(());
        }

        let results = join_all(perspectives.into_iter().map(|(name, perspective)| {
            let event = event.clone();
            async move { (name, perspective(event).await) }
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|error| format!("{name}: {error}")))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(WorkCoordinatorError::Handler {
                reason: failures.join("; "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wc_coordinator::WorkCoordinator;
    use wc_domain::{CoordinatorConfig, ProcessWorkBatchRequest, ProcessWorkBatchResponse};

    struct RecordingStore {
        received: std::sync::Mutex<Vec<NewOutboxMessage>>,
    }

    impl Store for RecordingStore {
        async fn process_work_batch(
            &self,
            request: ProcessWorkBatchRequest,
        ) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
            self.received.lock().unwrap().extend(request.new_outbox_messages);
            Ok(ProcessWorkBatchResponse::default())
        }
    }

    fn dispatcher_with_store(store: Arc<RecordingStore>) -> Dispatcher<RecordingStore> {
        let coordinator = Arc::new(WorkCoordinator::new(store, CoordinatorConfig::default()));
        let strategy = Arc::new(WorkCoordinatorStrategy::new(
            coordinator,
            &CoordinatorConfig::default(),
            wc_domain::StrategyKind::Immediate,
            wc_domain::InstanceId::new(),
            "svc",
            "host",
            1,
        ));
        let mut routes = RoutingTable::new();
        routes.register_receptor(
            "CreateOrder",
            Arc::new(|_message_type, payload_bytes| {
                Box::pin(async move {
                    Ok(crate::routing::ReceptorOutcome {
                        message_type: "OrderCreatedEvent".to_string(),
                        stream_id: StreamId::new(),
                        topic: "orders".to_string(),
                        payload_bytes,
                        is_event: true,
                    })
                })
            }),
        );
        Dispatcher::new(routes, strategy)
    }

    #[tokio::test]
    async fn send_async_enqueues_receptor_outcome_as_outbox_row() {
        let store = Arc::new(RecordingStore { received: std::sync::Mutex::new(vec![]) });
        let dispatcher = dispatcher_with_store(store.clone());

        let receipt = dispatcher
            .send_async("CreateOrder", StreamId::new(), b"{}".to_vec(), None, None)
            .await
            .unwrap();

        assert_eq!(receipt.status, DispatchStatus::Accepted);
        assert_eq!(receipt.destination, "orders");
        assert_eq!(store.received.lock().unwrap().len(), 1);
        assert!(store.received.lock().unwrap()[0].is_event);
    }

    #[tokio::test]
    async fn send_async_rejects_unknown_message_type() {
        let store = Arc::new(RecordingStore { received: std::sync::Mutex::new(vec![]) });
        let dispatcher = dispatcher_with_store(store);

        let result = dispatcher
            .send_async("NoSuchCommand", StreamId::new(), vec![], None, None)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn publish_async_aggregates_perspective_failures() {
        let store = Arc::new(RecordingStore { received: std::sync::Mutex::new(vec![]) });
        let dispatcher = dispatcher_with_store(store);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut routes = RoutingTable::new();
        let calls_a = calls.clone();
        routes.register_perspective(
            "OrderCreated",
            "OrderSummary",
            Arc::new(move |_event| {
                let calls_a = calls_a.clone();
                Box::pin(async move {
                    calls_a.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );
        routes.register_perspective(
            "OrderCreated",
            "OrderAudit",
            Arc::new(|_event| {
                Box::pin(async move {
                    Err(WorkCoordinatorError::Handler {
                        reason: "audit sink unreachable".to_string(),
                    })
                })
            }),
        );
        let dispatcher = Dispatcher::new(routes, dispatcher.strategy.clone());

        let result = dispatcher
            .publish_async(EventMessage {
                event_type: "OrderCreated".to_string(),
                stream_id: StreamId::new(),
                sequence_number: 1,
                payload_bytes: vec![],
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
