use super::*;
use std::sync::atomic::Ordering;

/// Read-only accessors for monitoring and tests.
impl ChunkIdAllocator {
    /// Number of counter slots.
    pub fn shard_slots(&self) -> usize {
        self.counters.len()
    }

    /// Sequence the next allocation on `shard` will receive.
    ///
    /// Loaded with relaxed ordering; concurrent allocations may move it.
    pub fn next_sequence(&self, shard: ShardId) -> u64 {
        self.counter(shard).load(Ordering::Relaxed) & SEQUENCE_MASK
    }

    /// Move `shard`'s counter to `sequence`. Used to exercise wrap handling.
    pub fn seed_sequence(&self, shard: ShardId, sequence: u64) {
        self.counter(shard).store(sequence, Ordering::Relaxed);
    }
}
