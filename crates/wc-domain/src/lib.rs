//! Work Coordinator domain core.
//!
//! Pure types and logic for the transactional outbox/inbox engine described
//! by the Work Coordinator design: the message envelope, the persisted row
//! shapes, the `process_work_batch` wire contract, tuning configuration, and
//! the shared error taxonomy. This crate holds no I/O — it must not import a
//! database client, an HTTP framework, or a message bus SDK.

pub mod batch;
pub mod config;
pub mod envelope;
pub mod errors;
pub mod hashing;
pub mod ids;
pub mod partition;
pub mod rows;
pub mod status;

pub use batch::*;
pub use config::*;
pub use envelope::*;
pub use errors::*;
pub use hashing::*;
pub use ids::*;
pub use partition::*;
pub use rows::*;
pub use status::*;
