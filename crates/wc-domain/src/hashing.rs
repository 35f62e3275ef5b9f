//! Idempotency hashing, grounded on the outbox message-hash pattern used
//! elsewhere in this codebase: a deterministic fingerprint over identity
//! fields, not payload contents, cheap enough to compute on every insert.

use sha2::{Digest, Sha256};

use crate::ids::{MessageId, StreamId};

/// Deterministic fingerprint of a message's identity. Two calls with the
/// same `message_id`/`stream_id`/`sequence_order` always produce the same
/// hash; this underlies dedup checks distinct from the primary-key
/// collapse the Store performs on insert.
pub fn message_fingerprint(message_id: &MessageId, stream_id: &StreamId, sequence_order: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message_id.to_string().as_bytes());
    hasher.update(stream_id.to_string().as_bytes());
    hasher.update(sequence_order.to_le_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let message_id = MessageId::new();
        let stream_id = StreamId::new();
        let a = message_fingerprint(&message_id, &stream_id, 1);
        let b = message_fingerprint(&message_id, &stream_id, 1);
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn fingerprint_changes_with_sequence_order() {
        let message_id = MessageId::new();
        let stream_id = StreamId::new();
        let a = message_fingerprint(&message_id, &stream_id, 1);
        let b = message_fingerprint(&message_id, &stream_id, 2);
        assert_ne!(a, b);
    }
}
