//! NATS JetStream adapter for the [`Transport`] port (§6).
//!
//! One JetStream stream with a catch-all subject binding, since topics here
//! are caller-chosen strings (`NewOutboxMessage::topic`) rather than a fixed
//! enum — unlike this codebase's other JetStream adapter, which binds one
//! subject per domain event kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_nats::jetstream::{
    self,
    consumer::{pull::Config as PullConsumerConfig, AckPolicy, DeliverPolicy, ReplayPolicy},
    stream::Config as StreamConfig,
    AckKind, Context as JetStreamContext,
};
use async_nats::Client as NatsClient;
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use wc_domain::{MessageEnvelope, WorkCoordinatorError};
use wc_ports::{PublishOutcome, ReceiveStream, ReceivedMessage, Transport};

use crate::config::NatsTransportConfig;
use crate::wire::WireMessage;

pub struct NatsTransport {
    client: NatsClient,
    jetstream: JetStreamContext,
    config: NatsTransportConfig,
    pending: Arc<RwLock<HashMap<String, jetstream::Message>>>,
}

impl NatsTransport {
    pub async fn connect(config: NatsTransportConfig) -> Result<Self, WorkCoordinatorError> {
        info!(url = %config.url, "connecting to NATS");
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| WorkCoordinatorError::TransientTransport {
                reason: format!("connect: {e}"),
            })?;
        let jetstream = jetstream::new(client.clone());

        let transport = Self {
            client,
            jetstream,
            config,
            pending: Arc::new(RwLock::new(HashMap::new())),
        };
        transport.ensure_stream().await?;
        Ok(transport)
    }

    async fn ensure_stream(&self) -> Result<(), WorkCoordinatorError> {
        let stream_config = StreamConfig {
            name: self.config.stream_name.clone(),
            subjects: vec![format!("{}.>", self.config.stream_name)],
            max_age: std::time::Duration::from_secs(self.config.message_ttl_secs.max(0) as u64),
            duplicate_window: std::time::Duration::from_secs(self.config.duplicate_window_secs.max(0) as u64),
            ..Default::default()
        };

        match self.jetstream.get_stream(&self.config.stream_name).await {
            Ok(_) => {
                self.jetstream
                    .update_stream(stream_config)
                    .await
                    .map_err(|e| WorkCoordinatorError::Storage {
                        reason: format!("update stream: {e}"),
                    })?;
            }
            Err(_) => {
                self.jetstream
                    .create_stream(stream_config)
                    .await
                    .map_err(|e| WorkCoordinatorError::Storage {
                        reason: format!("create stream: {e}"),
                    })?;
            }
        }
        Ok(())
    }

    fn full_subject(&self, topic: &str) -> String {
        format!("{}.{}", self.config.stream_name, topic)
    }
}

impl Transport for NatsTransport {
    type Subscription = NatsReceiveStream;

    #[instrument(skip(self, payload_bytes, envelope), fields(topic = %topic, message_id = %message_id))]
    async fn publish(
        &self,
        topic: &str,
        message_id: &str,
        payload_bytes: &[u8],
        envelope: &MessageEnvelope,
    ) -> Result<PublishOutcome, WorkCoordinatorError> {
        let wire = WireMessage {
            envelope: envelope.clone(),
            payload_bytes: payload_bytes.to_vec(),
        };
        let body = serde_json::to_vec(&wire).map_err(|e| WorkCoordinatorError::PermanentTransport {
            reason: format!("serialize envelope: {e}"),
        })?;

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", message_id.to_string());

        let publish = self
            .jetstream
            .publish_with_headers(self.full_subject(topic), headers, body.into())
            .await;

        let ack = match publish {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "publish failed");
                return Ok(PublishOutcome::TransientError);
            }
        };

        match ack.await {
            Ok(_) => Ok(PublishOutcome::Delivered),
            Err(e) => {
                warn!(error = %e, "publish ack failed");
                Ok(PublishOutcome::TransientError)
            }
        }
    }

    async fn receive(&self, topic: &str) -> Result<Self::Subscription, WorkCoordinatorError> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| WorkCoordinatorError::Storage {
                reason: format!("get stream: {e}"),
            })?;

        let consumer_name = format!("{}-{}", self.config.consumer_prefix, topic.replace(['.', '>'], "-"));
        let consumer_config = PullConsumerConfig {
            durable_name: Some(consumer_name.clone()),
            ack_policy: AckPolicy::Explicit,
            deliver_policy: DeliverPolicy::All,
            replay_policy: ReplayPolicy::Instant,
            filter_subject: self.full_subject(topic),
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&consumer_name, consumer_config)
            .await
            .map_err(|e| WorkCoordinatorError::Storage {
                reason: format!("create consumer: {e}"),
            })?;

        Ok(NatsReceiveStream {
            consumer,
            topic: topic.to_string(),
            pending: self.pending_acks(),
        })
    }

    async fn ack(&self, message_id: &str) -> Result<(), WorkCoordinatorError> {
        self.finish_delivery(message_id, AckKind::Ack).await
    }

    async fn nack(&self, message_id: &str) -> Result<(), WorkCoordinatorError> {
        self.finish_delivery(message_id, AckKind::Nak(None)).await
    }
}

impl NatsTransport {
    fn pending_acks(&self) -> Arc<RwLock<HashMap<String, jetstream::Message>>> {
        self.pending.clone()
    }

    async fn finish_delivery(&self, message_id: &str, kind: AckKind) -> Result<(), WorkCoordinatorError> {
        let message = {
            let mut pending = self.pending.write().await;
            pending.remove(message_id)
        };
        let Some(message) = message else {
            debug!(message_id = %message_id, "ack/nack for message with no pending delivery, ignoring");
            return Ok(());
        };
        message.ack_with(kind).await.map_err(|e| WorkCoordinatorError::TransientTransport {
            reason: format!("ack/nack: {e}"),
        })
    }
}

pub struct NatsReceiveStream {
    consumer: jetstream::consumer::Consumer<jetstream::consumer::pull::Config>,
    topic: String,
    pending: Arc<RwLock<HashMap<String, jetstream::Message>>>,
}

impl ReceiveStream for NatsReceiveStream {
    async fn next(&mut self) -> Option<ReceivedMessage> {
        let mut messages = self.consumer.fetch().max_messages(1).messages().await.ok()?;
        let message = messages.next().await?.ok()?;

        let wire: WireMessage = match serde_json::from_slice(&message.payload) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, topic = %self.topic, "dropping malformed message");
                let _ = message.ack_with(AckKind::Term).await;
                return None;
            }
        };

        let message_id = wire.envelope.message_id.to_string();
        {
            let mut pending = self.pending.write().await;
            pending.insert(message_id, message);
        }

        Some(ReceivedMessage {
            envelope: wire.envelope,
            source_topic: self.topic.clone(),
            payload_bytes: wire.payload_bytes,
        })
    }
}
