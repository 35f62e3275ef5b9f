//! In-memory scenario harness exercising the Store port end to end, per
//! WC-SPEC §8.
//!
//! [`InMemoryStore`] reproduces every transactional guarantee
//! `wc-postgres::PostgresStore` makes for `process_work_batch` without a
//! database, so the coordinator's invariants can be checked against it
//! directly. [`run_all`] drives scenarios S1 through S6 against fresh stores
//! and reports one [`ScenarioOutcome`] per scenario.

pub mod fakes;
pub mod scenarios;

pub use fakes::InMemoryStore;
pub use scenarios::{run_all, ScenarioOutcome};
