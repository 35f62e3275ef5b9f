//! Routing table for the Dispatcher (C7), per WC-SPEC §4.7.
//!
//! Resolution of `{MessageType → receptor}` and `{EventType → [perspectives]}`
//! happens at service startup; this module only holds the resulting table and
//! performs lookups. How a host discovers its receptors/perspectives (DI
//! scanning, manual registration, a build script) is out of scope here, same
//! as it is out of scope for the Dispatcher's own responsibilities.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use wc_domain::{StreamId, WorkCoordinatorError};

/// What a receptor hands back: either a declared event (durably enqueued with
/// `is_event=true`) or a plain reply (enqueued with `is_event=false`). The
/// domain convention from WC-SPEC §4.7 — "result object is a declared event
/// type, not a plain reply" — is expressed here as a field the receptor sets
/// itself, since this crate has no way to inspect the caller's type system.
pub struct ReceptorOutcome {
    pub message_type: String,
    pub stream_id: StreamId,
    pub topic: String,
    pub payload_bytes: Vec<u8>,
    pub is_event: bool,
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A registered command handler: takes the inbound payload and the command's
/// `MessageType`, returns the outcome to enqueue (or a handler error).
pub type Receptor = Arc<dyn Fn(String, Vec<u8>) -> BoxFuture<Result<ReceptorOutcome, WorkCoordinatorError>> + Send + Sync>;

/// A registered perspective handler invoked for one event.
pub type Perspective = Arc<dyn Fn(EventMessage) -> BoxFuture<Result<(), WorkCoordinatorError>> + Send + Sync>;

/// The event payload handed to perspective handlers, per WC-SPEC §4.6 step 4.
#[derive(Debug, Clone)]
pub struct EventMessage {
    pub event_type: String,
    pub stream_id: StreamId,
    pub sequence_number: i64,
    pub payload_bytes: Vec<u8>,
}

#[derive(Default)]
pub struct RoutingTable {
    receptors: HashMap<String, Receptor>,
    perspectives: HashMap<String, Vec<(String, Perspective)>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_receptor(&mut self, message_type: impl Into<String>, receptor: Receptor) {
        self.receptors.insert(message_type.into(), receptor);
    }

    pub fn register_perspective(&mut self, event_type: impl Into<String>, name: impl Into<String>, perspective: Perspective) {
        self.perspectives
            .entry(event_type.into())
            .or_default()
            .push((name.into(), perspective));
    }

    pub fn receptor_for(&self, message_type: &str) -> Option<Receptor> {
        self.receptors.get(message_type).cloned()
    }

    pub fn perspectives_for(&self, event_type: &str) -> Vec<(String, Perspective)> {
        self.perspectives.get(event_type).cloned().unwrap_or_default()
    }
}
