//! `WorkCoordinator` (C2): a thin validating facade in front of the Store
//! port. It adds no persistence of its own — every invariant it enforces is
//! argument validation that would otherwise leave a malformed request to
//! fail deep inside a transaction.

use std::sync::Arc;

use tracing::instrument;

use wc_domain::{CoordinatorConfig, ProcessWorkBatchRequest, ProcessWorkBatchResponse, WorkCoordinatorError};
use wc_ports::Store;

pub struct WorkCoordinator<S: Store> {
    store: Arc<S>,
    config: CoordinatorConfig,
}

impl<S: Store> WorkCoordinator<S> {
    pub fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Validate and forward to the Store. Per WC-SPEC §4.2, the coordinator
    /// itself never touches storage state — it only rejects what the Store
    /// would otherwise have to fail mid-transaction.
    #[instrument(skip(self, request), fields(instance_id = %request.instance_id))]
    pub async fn process_work_batch(
        &self,
        mut request: ProcessWorkBatchRequest,
    ) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
        self.config.validate().map_err(|reason| WorkCoordinatorError::Validation { reason })?;
        validate_request(&request)?;

        if request.partition_count == 0 {
            request.partition_count = self.config.partition_count;
        }
        if request.max_partitions_per_instance == 0 {
            request.max_partitions_per_instance = self.config.max_partitions_per_instance;
        }
        if request.lease_seconds == 0 {
            request.lease_seconds = self.config.lease_seconds;
        }
        if request.stale_threshold_seconds == 0 {
            request.stale_threshold_seconds = self.config.stale_threshold_seconds;
        }
        if request.max_claim_batch == 0 {
            request.max_claim_batch = self.config.max_claim_batch;
        }

        self.store.process_work_batch(request).await
    }
}

fn validate_request(request: &ProcessWorkBatchRequest) -> Result<(), WorkCoordinatorError> {
    if request.service_name.trim().is_empty() {
        return Err(WorkCoordinatorError::Validation {
            reason: "service_name must not be empty".to_string(),
        });
    }
    for message in &request.new_outbox_messages {
        if message.message_type.trim().is_empty() {
            return Err(WorkCoordinatorError::Validation {
                reason: format!("outbox message {} has empty message_type", message.message_id),
            });
        }
    }
    for message in &request.new_inbox_messages {
        if message.message_type.trim().is_empty() {
            return Err(WorkCoordinatorError::Validation {
                reason: format!("inbox message {} has empty message_type", message.message_id),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wc_domain::InstanceId;

    struct CountingStore {
        calls: AtomicUsize,
    }

    impl Store for CountingStore {
        async fn process_work_batch(
            &self,
            request: ProcessWorkBatchRequest,
        ) -> Result<ProcessWorkBatchResponse, WorkCoordinatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProcessWorkBatchResponse {
                claimed_outbox_messages: vec![],
                claimed_inbox_messages: vec![],
                assigned_partitions: vec![],
            })
        }
    }

    #[tokio::test]
    async fn empty_service_name_is_rejected_before_reaching_the_store() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let coordinator = WorkCoordinator::new(store.clone(), CoordinatorConfig::default());

        let request = ProcessWorkBatchRequest::heartbeat(InstanceId::new(), "", "host", 1);
        let result = coordinator.process_work_batch(request).await;

        assert!(result.is_err());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_heartbeat_reaches_the_store() {
        let store = Arc::new(CountingStore { calls: AtomicUsize::new(0) });
        let coordinator = WorkCoordinator::new(store.clone(), CoordinatorConfig::default());

        let request = ProcessWorkBatchRequest::heartbeat(InstanceId::new(), "svc", "host", 1);
        let result = coordinator.process_work_batch(request).await;

        assert!(result.is_ok());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
