//! PublisherWorker (C5), per WC-SPEC §4.5: continually claims outbox work
//! and delivers it to Transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use wc_coordinator::{OrderedStreamProcessor, WorkCoordinatorStrategy};
use wc_domain::{MessageEnvelope, MessageId, MessageProcessingStatus, OutboxCompletion, OutboxFailure, OutboxRow};
use wc_ports::{PublishOutcome, Store, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Draining,
    Stopped,
}

pub struct PublisherWorker<S: Store, T: Transport> {
    strategy: Arc<WorkCoordinatorStrategy<S>>,
    transport: Arc<T>,
    stream_processor: OrderedStreamProcessor,
    idle_backoff: Duration,
    lease_renew_interval: Duration,
    state: Arc<RwLock<WorkerState>>,
    in_flight: Arc<Mutex<HashMap<MessageId, Instant>>>,
}

impl<S: Store + 'static, T: Transport + 'static> PublisherWorker<S, T> {
    pub fn new(
        strategy: Arc<WorkCoordinatorStrategy<S>>,
        transport: Arc<T>,
        max_stream_parallelism: usize,
        idle_backoff: Duration,
        lease_seconds: i64,
    ) -> Self {
        Self {
            strategy,
            transport,
            stream_processor: OrderedStreamProcessor::new(max_stream_parallelism),
            idle_backoff,
            lease_renew_interval: Duration::from_secs((lease_seconds.max(3) / 3) as u64),
            state: Arc::new(RwLock::new(WorkerState::Starting)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    /// Run until `stop()` flips the state out of `Running`. Per WC-SPEC
    /// §4.5's state machine: `Starting → Running`, loop while `Running`,
    /// then `Draining` (finish in-flight reporting, final flush) → `Stopped`.
    pub async fn run(&self) {
        self.set_state(WorkerState::Running).await;
        info!("publisher worker entering run loop");

        let renewal_task = self.spawn_renewal_task();

        while self.state().await == WorkerState::Running {
            if let Err(error) = self.run_round().await {
                warn!(%error, "publisher round failed, backing off");
                tokio::time::sleep(self.idle_backoff).await;
            }
        }

        renewal_task.abort();
        self.set_state(WorkerState::Draining).await;
        if let Err(error) = self.strategy.flush().await {
            warn!(%error, "final drain flush failed");
        }
        self.set_state(WorkerState::Stopped).await;
        info!("publisher worker stopped");
    }

    pub async fn stop(&self) {
        self.set_state(WorkerState::Draining).await;
    }

    #[instrument(skip(self))]
    async fn run_round(&self) -> Result<(), wc_domain::WorkCoordinatorError> {
        let response = self.strategy.flush_and_claim().await?;

        if response.claimed_outbox_messages.is_empty() {
            tokio::time::sleep(self.idle_backoff).await;
            return Ok(());
        }

        {
            let mut in_flight = self.in_flight.lock().await;
            let now = Instant::now();
            for row in &response.claimed_outbox_messages {
                in_flight.insert(row.message_id, now);
            }
        }

        let transport = self.transport.clone();
        let strategy = self.strategy.clone();
        let in_flight = self.in_flight.clone();

        self.stream_processor
            .process(response.claimed_outbox_messages, move |row: OutboxRow| {
                let transport = transport.clone();
                let strategy = strategy.clone();
                let in_flight = in_flight.clone();
                async move {
                    let result = publish_one(transport.as_ref(), strategy.as_ref(), &row).await;
                    in_flight.lock().await.remove(&row.message_id);
                    result
                }
            })
            .await;

        self.strategy.flush().await?;
        Ok(())
    }

    fn spawn_renewal_task(&self) -> tokio::task::JoinHandle<()> {
        let strategy = self.strategy.clone();
        let in_flight = self.in_flight.clone();
        let interval = self.lease_renew_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let stale: Vec<MessageId> = {
                    let in_flight = in_flight.lock().await;
                    let now = Instant::now();
                    in_flight
                        .iter()
                        .filter(|(_, claimed_at)| now.duration_since(**claimed_at) > interval)
                        .map(|(id, _)| *id)
                        .collect()
                };
                for message_id in stale {
                    if let Err(error) = strategy.enqueue_renew_outbox_lease(message_id).await {
                        warn!(%error, "lease renewal enqueue failed");
                    }
                }
            }
        })
    }
}

async fn publish_one<T: Transport>(
    transport: &T,
    strategy: &WorkCoordinatorStrategy<impl Store>,
    row: &OutboxRow,
) -> Result<(), wc_domain::WorkCoordinatorError> {
    let envelope = MessageEnvelope {
        message_id: row.message_id,
        correlation_id: row.correlation_id,
        causation_id: row.causation_id,
        message_type: row.message_type.clone(),
        stream_id: row.stream_id,
        partition_number: row.partition_number,
        sequence_order: row.sequence_order,
        hops: vec![],
        created_at: row.created_at,
    };

    let outcome = transport
        .publish(&row.topic, &row.message_id.to_string(), &row.payload_bytes, &envelope)
        .await?;

    match outcome {
        PublishOutcome::Delivered => {
            strategy
                .enqueue_outbox_completion(OutboxCompletion {
                    message_id: row.message_id,
                    status: MessageProcessingStatus::Published,
                })
                .await
        }
        PublishOutcome::TransientError | PublishOutcome::PermanentError => {
            strategy
                .enqueue_outbox_failure(OutboxFailure {
                    message_id: row.message_id,
                    status: MessageProcessingStatus::Failed,
                    error: format!("{outcome:?}"),
                    stack_trace: None,
                    is_permanent: outcome == PublishOutcome::PermanentError,
                })
                .await
        }
    }
}
