//! PostgreSQL adapter for the Store port (C1): outbox, inbox, event store,
//! receptor-processing audit trail, and perspective checkpoints, behind one
//! atomic `process_work_batch` transaction. No `sqlx migrate` step — schema
//! is brought up idempotently at connect time, the same way this codebase's
//! other Postgres adapter brings up its own tables.

pub mod rowconv;
pub mod schema;
pub mod store;

pub use store::PostgresStore;
