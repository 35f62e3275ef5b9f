//! Dispatcher (C7): in-process command/event entry points, per WC-SPEC §4.7.
//!
//! Routing-table *generation* (how a host discovers its receptors and
//! perspectives), RPC/queueing transports, and per-component metrics are out
//! of scope here — this crate only holds the resolved table and performs
//! lookups against it.

pub mod dispatcher;
pub mod routing;

pub use dispatcher::{DeliveryReceipt, DispatchStatus, Dispatcher};
pub use routing::{EventMessage, Perspective, Receptor, ReceptorOutcome, RoutingTable};
