//! WorkCoordinator facade (C2), its buffering strategies (C3), and the
//! Ordered Stream Processor (C4).
//!
//! This crate adds no storage of its own; it sits in front of a
//! [`wc_ports::Store`] implementation and shapes how callers invoke
//! `process_work_batch`.

pub mod coordinator;
pub mod ordered_stream;
pub mod strategy;

pub use coordinator::WorkCoordinator;
pub use ordered_stream::{OrderedStreamProcessor, StepOutcome, StreamOrdered};
pub use strategy::WorkCoordinatorStrategy;
