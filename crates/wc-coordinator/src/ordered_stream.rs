//! Ordered Stream Processor (C4): groups claimed rows by stream, runs each
//! stream's rows strictly in order, and runs distinct streams concurrently up
//! to `max_stream_parallelism`, per WC-SPEC §5.
//!
//! Per-stream ordering is the hard guarantee; cross-stream interleaving is
//! unspecified and intentionally left to the scheduler.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

use wc_domain::{InboxRow, OutboxRow, StreamId, WorkCoordinatorError};

/// A row that belongs to exactly one stream and carries a stable
/// within-stream ordering key.
pub trait StreamOrdered {
    fn stream_id(&self) -> StreamId;
    fn sort_key(&self) -> i64;
}

impl StreamOrdered for OutboxRow {
    fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    fn sort_key(&self) -> i64 {
        self.sequence_order
    }
}

impl StreamOrdered for InboxRow {
    fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    fn sort_key(&self) -> i64 {
        self.sequence_order
    }
}

/// Outcome of a single row's turn through `action`, identified by the row's
/// stream and sort key rather than the row itself, since `action` consumes
/// its row by value.
#[derive(Debug)]
pub struct StepOutcome {
    pub stream_id: StreamId,
    pub sort_key: i64,
    pub result: Result<(), WorkCoordinatorError>,
}

pub struct OrderedStreamProcessor {
    max_stream_parallelism: usize,
}

impl OrderedStreamProcessor {
    pub fn new(max_stream_parallelism: usize) -> Self {
        Self {
            max_stream_parallelism: max_stream_parallelism.max(1),
        }
    }

    /// Partition `rows` by stream and process each stream's rows, in order,
    /// through `action`. At most `max_stream_parallelism` streams run at
    /// once; a failure on one row does not stop other streams, but it does
    /// stop the remainder of its own stream (later rows of that stream may
    /// depend on state the failed row was meant to establish).
    #[instrument(skip(self, rows, action))]
    pub async fn process<Row, Action, Fut>(&self, rows: Vec<Row>, action: Action) -> Vec<StepOutcome>
    where
        Row: StreamOrdered + Send + 'static,
        Action: Fn(Row) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkCoordinatorError>> + Send,
    {
        let mut by_stream: BTreeMap<StreamId, Vec<Row>> = BTreeMap::new();
        for row in rows {
            by_stream.entry(row.stream_id()).or_default().push(row);
        }
        for group in by_stream.values_mut() {
            group.sort_by_key(|row| row.sort_key());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_stream_parallelism));
        let action = Arc::new(action);
        let mut tasks = FuturesUnordered::new();

        for (stream_id, group) in by_stream {
            let semaphore = semaphore.clone();
            let action = action.clone();
            tasks.push(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                process_stream(stream_id, group, action.as_ref()).await
            });
        }

        let mut results = Vec::new();
        while let Some(stream_results) = tasks.next().await {
            results.extend(stream_results);
        }
        results
    }
}

async fn process_stream<Row, Action, Fut>(stream_id: StreamId, rows: Vec<Row>, action: &Action) -> Vec<StepOutcome>
where
    Row: StreamOrdered,
    Action: Fn(Row) -> Fut,
    Fut: Future<Output = Result<(), WorkCoordinatorError>>,
{
    let mut results = Vec::with_capacity(rows.len());
    let mut halted = false;
    for row in rows {
        let sort_key = row.sort_key();
        if halted {
            results.push(StepOutcome {
                stream_id,
                sort_key,
                result: Err(WorkCoordinatorError::Validation {
                    reason: format!("skipped: an earlier row in stream {stream_id} failed"),
                }),
            });
            continue;
        }
        match action(row).await {
            Ok(()) => results.push(StepOutcome {
                stream_id,
                sort_key,
                result: Ok(()),
            }),
            Err(error) => {
                warn!(%stream_id, %error, "ordered stream processing failed, halting stream");
                halted = true;
                results.push(StepOutcome {
                    stream_id,
                    sort_key,
                    result: Err(error),
                });
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use wc_domain::{CorrelationId, MessageId, RowStatus};

    fn outbox_row(stream_id: StreamId, sequence_order: i64) -> OutboxRow {
        OutboxRow {
            message_id: MessageId::new(),
            correlation_id: CorrelationId::new(),
            causation_id: None,
            message_type: "CreateOrder".to_string(),
            stream_id,
            partition_number: 0,
            sequence_order,
            topic: "orders".to_string(),
            payload_bytes: vec![],
            status: RowStatus::Claimed,
            instance_id: None,
            lease_expiry: None,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rows_within_a_stream_are_processed_in_sequence_order() {
        let processor = OrderedStreamProcessor::new(4);
        let stream_id = StreamId::new();
        let rows = vec![outbox_row(stream_id, 3), outbox_row(stream_id, 1), outbox_row(stream_id, 2)];

        let observed_order = Arc::new(Mutex::new(Vec::new()));
        let observed_order_clone = observed_order.clone();

        let outcomes = processor
            .process(rows, move |row: OutboxRow| {
                let observed_order = observed_order_clone.clone();
                async move {
                    observed_order.lock().unwrap().push(row.sequence_order);
                    Ok(())
                }
            })
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(*observed_order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn a_failure_halts_only_its_own_stream() {
        let processor = OrderedStreamProcessor::new(4);
        let failing_stream = StreamId::new();
        let healthy_stream = StreamId::new();

        let rows = vec![
            outbox_row(failing_stream, 1),
            outbox_row(failing_stream, 2),
            outbox_row(healthy_stream, 1),
            outbox_row(healthy_stream, 2),
        ];

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let outcomes = processor
            .process(rows, move |row: OutboxRow| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    if row.stream_id == failing_stream && row.sequence_order == 1 {
                        Err(WorkCoordinatorError::Validation {
                            reason: "boom".to_string(),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        let failing_outcomes: Vec<_> = outcomes.iter().filter(|o| o.stream_id == failing_stream).collect();
        let healthy_outcomes: Vec<_> = outcomes.iter().filter(|o| o.stream_id == healthy_stream).collect();

        assert_eq!(failing_outcomes.len(), 2);
        assert!(failing_outcomes.iter().all(|o| o.result.is_err()));
        assert_eq!(healthy_outcomes.len(), 2);
        assert!(healthy_outcomes.iter().all(|o| o.result.is_ok()));
    }
}
