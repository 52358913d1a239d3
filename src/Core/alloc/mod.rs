use super::shard::{ShardId, CONFIGURED_CPUS};
use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
mod debug;
mod getters;

/// Bits of a chunk id that hold the per-shard sequence.
pub const SEQUENCE_BITS: u32 = 48;

/// Mask selecting the per-shard sequence of a chunk id.
pub const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Globally unique identifier of one chunk.
///
/// Layout: `shard << 48 | sequence`. The value 0 is the "no chunk" sentinel
/// and is never handed out by [`ChunkIdAllocator`].
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkId(pub u64);

impl ChunkId {
    pub const NONE: ChunkId = ChunkId(0);

    #[inline]
    pub fn compose(shard: ShardId, sequence: u64) -> Self {
        ChunkId(((shard as u64) << SEQUENCE_BITS) | (sequence & SEQUENCE_MASK))
    }

    #[inline]
    pub fn shard(self) -> ShardId {
        (self.0 >> SEQUENCE_BITS) as ShardId
    }

    #[inline]
    pub fn sequence(self) -> u64 {
        self.0 & SEQUENCE_MASK
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ChunkId {
    fn from(raw: u64) -> Self {
        ChunkId(raw)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("ChunkId(none)")
        } else {
            write!(f, "ChunkId({}:{})", self.shard(), self.sequence())
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Lock-free chunk-id source with one counter per shard.
///
/// Shards never coordinate: uniqueness comes from the shard tag in the high
/// bits, so ids are unique across shards but carry no cross-shard order.
pub struct ChunkIdAllocator {
    counters: Box<[CachePadded<AtomicU64>]>,
}

impl ChunkIdAllocator {
    /// Allocator with `shards` independent counters (at least one).
    pub fn new(shards: usize) -> Self {
        let shards = shards.clamp(1, 1 << 16);
        let counters = (0..shards)
            .map(|_| CachePadded::new(AtomicU64::new(1)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { counters }
    }

    /// Allocator with one counter per configured CPU.
    pub fn per_cpu() -> Self {
        Self::new(*CONFIGURED_CPUS)
    }

    #[inline]
    fn counter(&self, shard: ShardId) -> &AtomicU64 {
        // Shards past the table share a slot; their tags still differ.
        &self.counters[shard as usize % self.counters.len()]
    }

    /// Next id for `shard`. Strictly increasing per shard until the 48-bit
    /// sequence wraps; a wrapped sequence of 0 is skipped.
    pub fn allocate_chunk_id(&self, shard: ShardId) -> ChunkId {
        let counter = self.counter(shard);
        loop {
            let seq = counter.fetch_add(1, Ordering::Relaxed) & SEQUENCE_MASK;
            if seq != 0 {
                return ChunkId::compose(shard, seq);
            }
        }
    }
}

impl Default for ChunkIdAllocator {
    fn default() -> Self {
        Self::per_cpu()
    }
}
