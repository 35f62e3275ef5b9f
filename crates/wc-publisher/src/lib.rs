//! PublisherWorker (C5): claims outbox work through the Interval
//! [`wc_coordinator::WorkCoordinatorStrategy`] and delivers it via Transport,
//! per WC-SPEC §4.5.

pub mod config;
pub mod worker;

pub use config::PublisherConfig;
pub use worker::{PublisherWorker, WorkerState};
