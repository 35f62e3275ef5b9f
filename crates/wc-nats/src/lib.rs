//! NATS JetStream adapter for the Transport port (§6): `Publish`/`Receive`/
//! `Ack`/`Nack` over a single JetStream stream with at-least-once delivery
//! and header-based deduplication.

pub mod config;
pub mod transport;
pub mod wire;

pub use config::NatsTransportConfig;
pub use transport::{NatsReceiveStream, NatsTransport};
