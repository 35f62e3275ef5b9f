//! NATS JetStream configuration, loaded from the environment in the style
//! used throughout this codebase (`from_env()` plus a hardcoded `Default`).

#[derive(Debug, Clone)]
pub struct NatsTransportConfig {
    pub url: String,
    pub stream_name: String,
    pub consumer_prefix: String,
    pub message_ttl_secs: i64,
    pub duplicate_window_secs: i64,
}

impl Default for NatsTransportConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "wc-messages".to_string(),
            consumer_prefix: "wc-consumer".to_string(),
            message_ttl_secs: 7 * 24 * 60 * 60,
            duplicate_window_secs: 120,
        }
    }
}

impl NatsTransportConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            url: std::env::var("WC_NATS_URL").unwrap_or(default.url),
            stream_name: std::env::var("WC_NATS_STREAM_NAME").unwrap_or(default.stream_name),
            consumer_prefix: std::env::var("WC_NATS_CONSUMER_PREFIX").unwrap_or(default.consumer_prefix),
            message_ttl_secs: std::env::var("WC_NATS_MESSAGE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.message_ttl_secs),
            duplicate_window_secs: std::env::var("WC_NATS_DUPLICATE_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.duplicate_window_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_nats() {
        let config = NatsTransportConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.message_ttl_secs, 7 * 24 * 60 * 60);
    }
}
