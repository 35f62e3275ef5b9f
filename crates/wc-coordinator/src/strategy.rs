//! `WorkCoordinatorStrategy` (C3): buffers calls meant for
//! `process_work_batch` and flushes them as one batch, per WC-SPEC §4.3.
//! Three variants, never mixed within a single scope:
//!
//! - `Immediate`: every enqueue flushes on its own.
//! - `Scoped`: accumulates until [`WorkCoordinatorStrategy::flush`] is
//!   called explicitly, or the configured item threshold is reached.
//! - `Interval`: a background task flushes on a fixed tick.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wc_domain::{
    CoordinatorConfig, InboxCompletion, InboxFailure, InstanceId, MessageId, NewInboxMessage, NewOutboxMessage,
    OutboxCompletion, OutboxFailure, PerspectiveCompletion, PerspectiveFailure, ProcessWorkBatchRequest,
    ProcessWorkBatchResponse, ReceptorCompletion, ReceptorFailure, StrategyKind, WorkCoordinatorError,
    WorkBatchFlags,
};
use wc_ports::Store;

use crate::coordinator::WorkCoordinator;

#[derive(Default)]
struct PendingBatch {
    outbox_completions: Vec<OutboxCompletion>,
    outbox_failures: Vec<OutboxFailure>,
    inbox_completions: Vec<InboxCompletion>,
    inbox_failures: Vec<InboxFailure>,
    receptor_completions: Vec<ReceptorCompletion>,
    receptor_failures: Vec<ReceptorFailure>,
    perspective_completions: Vec<PerspectiveCompletion>,
    perspective_failures: Vec<PerspectiveFailure>,
    new_outbox_messages: Vec<NewOutboxMessage>,
    new_inbox_messages: Vec<NewInboxMessage>,
    renew_outbox_lease_ids: Vec<MessageId>,
    renew_inbox_lease_ids: Vec<MessageId>,
}

impl PendingBatch {
    fn len(&self) -> usize {
        self.outbox_completions.len()
            + self.outbox_failures.len()
            + self.inbox_completions.len()
            + self.inbox_failures.len()
            + self.receptor_completions.len()
            + self.receptor_failures.len()
            + self.perspective_completions.len()
            + self.perspective_failures.len()
            + self.new_outbox_messages.len()
            + self.new_inbox_messages.len()
            + self.renew_outbox_lease_ids.len()
            + self.renew_inbox_lease_ids.len()
    }

    fn drain_into_request(
        &mut self,
        instance_id: InstanceId,
        service_name: &str,
        host_name: &str,
        process_id: i32,
        skip_claim: bool,
    ) -> ProcessWorkBatchRequest {
        let mut request = ProcessWorkBatchRequest::heartbeat(instance_id, service_name.to_string(), host_name.to_string(), process_id);
        request.outbox_completions = std::mem::take(&mut self.outbox_completions);
        request.outbox_failures = std::mem::take(&mut self.outbox_failures);
        request.inbox_completions = std::mem::take(&mut self.inbox_completions);
        request.inbox_failures = std::mem::take(&mut self.inbox_failures);
        request.receptor_completions = std::mem::take(&mut self.receptor_completions);
        request.receptor_failures = std::mem::take(&mut self.receptor_failures);
        request.perspective_completions = std::mem::take(&mut self.perspective_completions);
        request.perspective_failures = std::mem::take(&mut self.perspective_failures);
        request.new_outbox_messages = std::mem::take(&mut self.new_outbox_messages);
        request.new_inbox_messages = std::mem::take(&mut self.new_inbox_messages);
        request.renew_outbox_lease_ids = std::mem::take(&mut self.renew_outbox_lease_ids);
        request.renew_inbox_lease_ids = std::mem::take(&mut self.renew_inbox_lease_ids);
        if skip_claim {
            request.flags = request.flags.with(WorkBatchFlags::SKIP_CLAIM);
        }
        request
    }
}

pub struct WorkCoordinatorStrategy<S: Store> {
    coordinator: Arc<WorkCoordinator<S>>,
    kind: StrategyKind,
    instance_id: InstanceId,
    service_name: String,
    host_name: String,
    process_id: i32,
    threshold: usize,
    pending: Arc<Mutex<PendingBatch>>,
    interval_task: Option<JoinHandle<()>>,
}

impl<S: Store + 'static> WorkCoordinatorStrategy<S> {
    pub fn new(
        coordinator: Arc<WorkCoordinator<S>>,
        config: &CoordinatorConfig,
        kind: StrategyKind,
        instance_id: InstanceId,
        service_name: impl Into<String>,
        host_name: impl Into<String>,
        process_id: i32,
    ) -> Self {
        let mut strategy = Self {
            coordinator,
            kind,
            instance_id,
            service_name: service_name.into(),
            host_name: host_name.into(),
            process_id,
            threshold: config.flush_batch_threshold,
            pending: Arc::new(Mutex::new(PendingBatch::default())),
            interval_task: None,
        };

        if kind == StrategyKind::Interval {
            strategy.spawn_interval_task(config.flush_interval());
        }

        strategy
    }

    fn spawn_interval_task(&mut self, period: std::time::Duration) {
        let coordinator = self.coordinator.clone();
        let pending = self.pending.clone();
        let instance_id = self.instance_id;
        let service_name = self.service_name.clone();
        let host_name = self.host_name.clone();
        let process_id = self.process_id;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if let Err(error) =
                    flush_pending(&coordinator, &pending, instance_id, &service_name, &host_name, process_id, true).await
                {
                    warn!(%error, "interval flush failed");
                }
            }
        });
        self.interval_task = Some(handle);
    }

    pub async fn enqueue_outbox_completion(&self, completion: OutboxCompletion) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.outbox_completions.push(completion);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_outbox_failure(&self, failure: OutboxFailure) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.outbox_failures.push(failure);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_inbox_completion(&self, completion: InboxCompletion) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.inbox_completions.push(completion);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_inbox_failure(&self, failure: InboxFailure) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.inbox_failures.push(failure);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_new_outbox_message(&self, message: NewOutboxMessage) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.new_outbox_messages.push(message);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_new_inbox_message(&self, message: NewInboxMessage) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.new_inbox_messages.push(message);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_receptor_completion(&self, completion: ReceptorCompletion) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.receptor_completions.push(completion);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_receptor_failure(&self, failure: ReceptorFailure) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.receptor_failures.push(failure);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_perspective_completion(&self, completion: PerspectiveCompletion) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.perspective_completions.push(completion);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_perspective_failure(&self, failure: PerspectiveFailure) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.perspective_failures.push(failure);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_renew_outbox_lease(&self, message_id: MessageId) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.renew_outbox_lease_ids.push(message_id);
        }
        self.maybe_flush().await
    }

    pub async fn enqueue_renew_inbox_lease(&self, message_id: MessageId) -> Result<(), WorkCoordinatorError> {
        {
            let mut pending = self.pending.lock().await;
            pending.renew_inbox_lease_ids.push(message_id);
        }
        self.maybe_flush().await
    }

    async fn maybe_flush(&self) -> Result<(), WorkCoordinatorError> {
        let should_flush = match self.kind {
            StrategyKind::Immediate => true,
            StrategyKind::Scoped => {
                let pending = self.pending.lock().await;
                pending.len() >= self.threshold
            }
            StrategyKind::Interval => false,
        };

        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flush whatever is buffered right now, regardless of strategy, without
    /// claiming new work. Used explicitly by `Scoped` callers at the end of
    /// their scope (e.g. the Dispatcher, the ConsumerWorker's per-message
    /// scope) and as an escape hatch for the other two variants.
    pub async fn flush(&self) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
        flush_pending(
            &self.coordinator,
            &self.pending,
            self.instance_id,
            &self.service_name,
            &self.host_name,
            self.process_id,
            true,
        )
        .await
    }

    /// Flush whatever is buffered and additionally claim up to the
    /// coordinator's configured `max_claim_batch` outbox rows, per WC-SPEC
    /// §4.5 step 2. This is what `PublisherWorker` calls each round.
    pub async fn flush_and_claim(&self) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
        flush_pending(
            &self.coordinator,
            &self.pending,
            self.instance_id,
            &self.service_name,
            &self.host_name,
            self.process_id,
            false,
        )
        .await
    }
}

async fn flush_pending<S: Store>(
    coordinator: &WorkCoordinator<S>,
    pending: &Mutex<PendingBatch>,
    instance_id: InstanceId,
    service_name: &str,
    host_name: &str,
    process_id: i32,
    skip_claim: bool,
) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
    let request = {
        let mut pending = pending.lock().await;
        // A claiming flush always has to reach the Store, even with nothing
        // buffered, since claiming new work is the point of the call. A
        // skip-claim flush with nothing buffered really is a no-op.
        if skip_claim && pending.len() == 0 {
            return Ok(ProcessWorkBatchResponse::default());
        }
        pending.drain_into_request(instance_id, service_name, host_name, process_id, skip_claim)
    };
    debug!(service_name = %service_name, "flushing buffered work batch");
    coordinator.process_work_batch(request).await
}

impl<S: Store> Drop for WorkCoordinatorStrategy<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.interval_task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wc_domain::MessageId;

    struct CountingStore {
        calls: AtomicUsize,
    }

    impl Store for CountingStore {
        async fn process_work_batch(
            &self,
            _request: ProcessWorkBatchRequest,
        ) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessWorkBatchResponse::default())
        }
    }

    #[tokio::test]
    async fn immediate_strategy_flushes_on_every_enqueue() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let coordinator = Arc::new(WorkCoordinator::new(store.clone(), CoordinatorConfig::default()));
        let strategy = WorkCoordinatorStrategy::new(
            coordinator,
            &CoordinatorConfig::default(),
            StrategyKind::Immediate,
            InstanceId::new(),
            "svc",
            "host",
            1,
        );

        strategy
            .enqueue_outbox_completion(OutboxCompletion {
                message_id: MessageId::new(),
                status: wc_domain::MessageProcessingStatus::Completed,
            })
            .await
            .unwrap();
        strategy
            .enqueue_outbox_completion(OutboxCompletion {
                message_id: MessageId::new(),
                status: wc_domain::MessageProcessingStatus::Completed,
            })
            .await
            .unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scoped_strategy_only_flushes_at_threshold_or_explicit_flush() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let mut config = CoordinatorConfig::default();
        config.flush_batch_threshold = 2;
        let coordinator = Arc::new(WorkCoordinator::new(store.clone(), config.clone()));
        let strategy = WorkCoordinatorStrategy::new(
            coordinator,
            &config,
            StrategyKind::Scoped,
            InstanceId::new(),
            "svc",
            "host",
            1,
        );

        strategy
            .enqueue_outbox_completion(OutboxCompletion {
                message_id: MessageId::new(),
                status: wc_domain::MessageProcessingStatus::Completed,
            })
            .await
            .unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        strategy
            .enqueue_outbox_completion(OutboxCompletion {
                message_id: MessageId::new(),
                status: wc_domain::MessageProcessingStatus::Completed,
            })
            .await
            .unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_and_claim_reaches_the_store_even_when_nothing_is_buffered() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let coordinator = Arc::new(WorkCoordinator::new(store.clone(), CoordinatorConfig::default()));
        let strategy = WorkCoordinatorStrategy::new(
            coordinator,
            &CoordinatorConfig::default(),
            StrategyKind::Scoped,
            InstanceId::new(),
            "svc",
            "host",
            1,
        );

        strategy.flush_and_claim().await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn plain_flush_is_a_no_op_when_nothing_is_buffered() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let coordinator = Arc::new(WorkCoordinator::new(store.clone(), CoordinatorConfig::default()));
        let strategy = WorkCoordinatorStrategy::new(
            coordinator,
            &CoordinatorConfig::default(),
            StrategyKind::Scoped,
            InstanceId::new(),
            "svc",
            "host",
            1,
        );

        strategy.flush().await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
