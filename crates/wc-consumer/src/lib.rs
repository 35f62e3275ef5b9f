//! ConsumerWorker (C6): receives messages from Transport and drives
//! perspectives through the Ordered Stream Processor, using the inbox for
//! dedup, per WC-SPEC §4.6.

pub mod config;
pub mod worker;

pub use config::ConsumerConfig;
pub use worker::{ConsumerWorker, WorkerState};
