//! Work Coordinator port traits.
//!
//! Per WC-SPEC §1 and §6, concrete message transports and the persistence
//! engine are external collaborators referenced only by contract. This crate
//! defines those contracts:
//! - [`Store`]: the single atomic `process_work_batch` operation (C1, §4.1).
//! - [`Transport`]: the abstract `Publish`/`Receive`/`Ack`/`Nack` boundary
//!   (§6 Transport contract).
//! - [`Clock`]: injectable time source so lease/backoff logic is testable
//!   without a real clock.

use std::future::Future;

use wc_domain::{MessageEnvelope, ProcessWorkBatchRequest, ProcessWorkBatchResponse, WorkCoordinatorError};

/// The Store port (C1): a single atomic batch operation over outbox, inbox,
/// event-store, receptor-processing, and perspective-checkpoint tables, per
/// WC-SPEC §4.1 steps 1–13. Implementations MUST uphold every invariant
/// listed there, in particular: atomicity across steps 1–12, and
/// non-blocking (skip-locked or equivalent) claim semantics under
/// concurrent callers.
pub trait Store: Send + Sync {
    fn process_work_batch(
        &self,
        request: ProcessWorkBatchRequest,
    ) -> impl Future<Output = Result<ProcessWorkBatchResponse, WorkCoordinatorError>> + Send;
}

/// Outcome of a single publish attempt, per WC-SPEC §6 Transport contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    TransientError,
    PermanentError,
}

/// A message received from the transport, carrying its envelope for
/// dedup/ordering and the raw payload to hand to the inbox.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub envelope: MessageEnvelope,
    pub source_topic: String,
    pub payload_bytes: Vec<u8>,
}

/// A live subscription returned by [`Transport::receive`]. Mirrors the
/// receive-loop shape used by this codebase's message-bus adapters: pull one
/// message at a time so the caller controls backpressure.
pub trait ReceiveStream: Send {
    fn next(&mut self) -> impl Future<Output = Option<ReceivedMessage>> + Send;
}

/// The Transport port: `Publish`/`Receive`/`Ack`/`Nack`, per WC-SPEC §6.
/// No transport protocol is specified; this is the abstract boundary a
/// concrete adapter (NATS, or anything else) implements.
pub trait Transport: Send + Sync {
    type Subscription: ReceiveStream;

    fn publish(
        &self,
        topic: &str,
        message_id: &str,
        payload_bytes: &[u8],
        envelope: &MessageEnvelope,
    ) -> impl Future<Output = Result<PublishOutcome, WorkCoordinatorError>> + Send;

    fn receive(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Self::Subscription, WorkCoordinatorError>> + Send;

    fn ack(&self, message_id: &str) -> impl Future<Output = Result<(), WorkCoordinatorError>> + Send;

    fn nack(&self, message_id: &str) -> impl Future<Output = Result<(), WorkCoordinatorError>> + Send;
}

/// Injectable clock, so lease expiry and backoff logic can be driven by a
/// fixed or stepped clock in tests instead of the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

/// The production clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = clock.now();
        assert!(second >= first);
    }
}
