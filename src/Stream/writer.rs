use super::chunk::{ChunkHeader, SizeClass, CHUNK_HEADER_LEN, CHUNK_VERSION};
use super::stats::StreamStats;
use crate::error::ReserveError;
use crate::Channel::{Reservation, RingChannel};
use crate::Core::{ChunkId, ChunkIdAllocator, ShardId};

/// Writes chunks for one probe invocation on one shard.
///
/// Cheap to construct: it only borrows the shared channel, allocator and
/// counters. Holds no state between calls.
#[derive(Clone, Copy)]
pub struct ChunkWriter<'a> {
    pub(crate) channel: &'a RingChannel,
    pub(crate) ids: &'a ChunkIdAllocator,
    pub(crate) shard: ShardId,
    pub(crate) stats: &'a StreamStats,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(
        channel: &'a RingChannel,
        ids: &'a ChunkIdAllocator,
        shard: ShardId,
        stats: &'a StreamStats,
    ) -> Self {
        Self {
            channel,
            ids,
            shard,
            stats,
        }
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    pub fn stats(&self) -> &'a StreamStats {
        self.stats
    }

    /// Reserve one chunk and give it a fresh id.
    ///
    /// The id is allocated only once the reservation succeeded, so a full
    /// channel never consumes sequence numbers.
    pub fn open(&self, class: SizeClass) -> Result<OpenChunk<'a>, ReserveError> {
        let reservation = match self.channel.reserve(class.total_len()) {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, ReserveError::Full { .. }) {
                    StreamStats::bump(&self.stats.chunk_reserve_failures);
                }
                return Err(e);
            }
        };

        let id = self.ids.allocate_chunk_id(self.shard);
        Ok(OpenChunk {
            reservation,
            header: ChunkHeader {
                version: CHUNK_VERSION,
                size_class: class.code(),
                effective_length: 0,
                reserved: 0,
                chunk_id: id.raw(),
                next_chunk_id: 0,
            },
            capacity: class.payload_capacity(),
            stats: self.stats,
        })
    }
}

/// A reserved, not yet visible chunk. Owned exclusively by its writer.
///
/// Ends in [`OpenChunk::commit`] or [`OpenChunk::discard`]. Dropping it
/// discards the reservation.
pub struct OpenChunk<'a> {
    reservation: Reservation<'a>,
    header: ChunkHeader,
    capacity: usize,
    stats: &'a StreamStats,
}

impl<'a> OpenChunk<'a> {
    pub fn id(&self) -> ChunkId {
        self.header.id()
    }

    pub fn payload_capacity(&self) -> usize {
        self.capacity
    }

    pub fn effective_length(&self) -> usize {
        self.header.effective_length as usize
    }

    /// Copy up to `payload_capacity` bytes of `data` into the payload,
    /// replacing earlier contents. Returns the bytes stored.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.capacity);
        let payload = &mut self.reservation.as_mut_slice()[CHUNK_HEADER_LEN..];
        payload[..n].copy_from_slice(&data[..n]);
        self.header.effective_length = n as u16;
        n
    }

    /// Record the continuation. Must happen before commit.
    pub fn link(&mut self, next: ChunkId) {
        self.header.next_chunk_id = next.raw();
    }

    /// Stamp the header and make the chunk visible.
    pub fn commit(mut self) -> ChunkId {
        let id = self.id();
        self.reservation.as_mut_slice()[..CHUNK_HEADER_LEN]
            .copy_from_slice(bytemuck::bytes_of(&self.header));
        self.reservation.commit();
        StreamStats::bump(&self.stats.chunks_committed);
        id
    }

    pub fn discard(self) {
        self.reservation.discard();
        StreamStats::bump(&self.stats.chunks_discarded);
    }
}
