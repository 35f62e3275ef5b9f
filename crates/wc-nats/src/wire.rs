//! On-the-wire message shape. NATS payloads are opaque bytes, so the
//! envelope travels alongside the application payload as one JSON body
//! rather than in headers — headers only carry the dedup key.

use serde::{Deserialize, Serialize};
use wc_domain::MessageEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub envelope: MessageEnvelope,
    #[serde(with = "payload_as_base64")]
    pub payload_bytes: Vec<u8>,
}

mod payload_as_base64 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        use base64::Engine;
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}
