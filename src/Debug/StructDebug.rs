use crate::Channel::{Reservation, RingChannel};
use crate::Core::alloc::ChunkIdAllocator;
use std::fmt;

/// Debug function for ChunkIdAllocator
///
/// Shows the number of counter slots and the next sequence of the first
/// few shards. Sequences are read relaxed and may already be stale.
pub fn debug_chunk_id_allocator(
    allocator: &ChunkIdAllocator,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let shown = allocator.shard_slots().min(4);
    let next: Vec<u64> = (0..shown)
        .map(|shard| allocator.next_sequence(shard as u16))
        .collect();
    f.debug_struct("ChunkIdAllocator")
        .field("shard_slots", &allocator.shard_slots())
        .field("next_sequence", &next)
        .finish_non_exhaustive()
}

/// Debug function for RingChannel
///
/// Shows the band geometry and cursor distance without touching record
/// contents.
pub fn debug_ring_channel(channel: &RingChannel, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingChannel")
        .field("region", &format_args!("{:p}", channel.region.as_ptr()))
        .field("capacity", &channel.capacity())
        .field("used", &channel.used_bytes())
        .field("max_record_len", &channel.max_record_len())
        .field("name", &channel.name())
        .finish()
}

/// Debug function for Reservation
pub fn debug_reservation(reservation: &Reservation<'_>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Reservation")
        .field("offset", &reservation.record)
        .field("len", &reservation.len)
        .field("finalized", &reservation.finalized)
        .finish()
}
