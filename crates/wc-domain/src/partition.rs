//! Deterministic partitioning per WC-SPEC §3: `PartitionNumber` is a stable
//! non-cryptographic hash of `StreamId` modulo `partitionCount`.

use crate::ids::StreamId;
use std::hash::Hasher;
use std::hash::{BuildHasher, Hash};

/// FxHash-style stable hash (deterministic across process restarts, unlike
/// `std::collections::hash_map::RandomState`). We implement a tiny,
/// dependency-free FNV-1a variant here rather than pull in a hashing crate
/// for one function: the only requirement (WC-SPEC §3) is determinism, not
/// collision resistance against adversarial input.
struct StableHasher(u64);

impl Hasher for StableHasher {
    fn write(&mut self, bytes: &[u8]) {
        const FNV_PRIME: u64 = 0x100000001b3;
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[derive(Default, Clone, Copy)]
struct StableBuildHasher;

impl BuildHasher for StableBuildHasher {
    type Hasher = StableHasher;

    fn build_hasher(&self) -> StableHasher {
        StableHasher(0xcbf29ce484222325) // FNV offset basis
    }
}

/// Stable hash of a stream id, independent of process/run randomization.
pub fn stable_hash_stream_id(stream_id: &StreamId) -> u64 {
    let mut hasher = StableBuildHasher.build_hasher();
    stream_id.as_ulid().0.hash(&mut hasher);
    hasher.finish()
}

/// `PartitionNumber = stableHash(StreamId) mod partitionCount`, per
/// WC-SPEC §3. `partition_count` must be > 0 (validated by the coordinator
/// before this is ever called).
pub fn partition_for(stream_id: &StreamId, partition_count: u32) -> u32 {
    debug_assert!(partition_count > 0, "partition_count must be positive");
    (stable_hash_stream_id(stream_id) % partition_count as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitioning_is_deterministic() {
        let stream_id = StreamId::new();
        let a = partition_for(&stream_id, 10_000);
        let b = partition_for(&stream_id, 10_000);
        assert_eq!(a, b);
    }

    #[test]
    fn partition_is_in_range() {
        let stream_id = StreamId::new();
        let partition = partition_for(&stream_id, 16);
        assert!(partition < 16);
    }

    #[test]
    fn different_streams_can_land_in_different_partitions() {
        let mut partitions = std::collections::HashSet::new();
        for _ in 0..64 {
            let stream_id = StreamId::new();
            partitions.insert(partition_for(&stream_id, 16));
        }
        assert!(partitions.len() > 1, "expected spread across partitions");
    }
}
