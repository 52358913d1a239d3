use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// "DMXP_CHN"
pub const CHANNEL_MAGIC: u64 = 0x444D_5850_5F43_484E;

pub const CHANNEL_VERSION: u32 = 2;

/// Smallest accepted data capacity in bytes.
pub const MIN_CAPACITY: usize = 8 * 1024;

/// Per-record header: `[len | BUSY | DISCARD : u32][reserved : u32]`.
pub const RECORD_HEADER_LEN: usize = 8;

/// Records start on 8-byte boundaries.
pub const RECORD_ALIGN: usize = 8;

/// Record is reserved and still owned by its writer.
pub const BUSY_BIT: u32 = 1 << 31;

/// Record was discarded (or is tail padding); the consumer skips it.
pub const DISCARD_BIT: u32 = 1 << 30;

pub const LEN_MASK: u32 = DISCARD_BIT - 1;

/// Channel flag: wake the consumer on every commit.
pub const FLAG_NOTIFY: u32 = 1 << 0;

/// Bytes a record of `len` payload bytes occupies in the ring.
#[inline]
pub const fn record_span(len: usize) -> usize {
    (RECORD_HEADER_LEN + len + RECORD_ALIGN - 1) & !(RECORD_ALIGN - 1)
}

/// Control block at the start of a channel region.
///
/// The data band follows at `data_offset`. Cursors are free-running byte
/// positions; `position & (capacity - 1)` is the offset in the band.
#[repr(C, align(128))]
pub struct ChannelHeader {
    /// [`CHANNEL_MAGIC`] once initialised.
    pub magic: u64,

    pub version: u32,

    /// `FLAG_*` bits.
    pub flags: u32,

    /// Data band size in bytes. Power of two.
    pub capacity: u64,

    /// Byte offset of the data band from the region start.
    pub data_offset: u64,

    /// Futex word bumped on commit.
    pub signal: AtomicU32,

    /// Consumers currently asleep on `signal`.
    pub waiters: AtomicU32,

    /// End of the last reservation. Advanced under the reservation lock.
    pub producer_pos: CachePadded<AtomicU64>,

    /// Start of the oldest record not yet consumed.
    pub consumer_pos: CachePadded<AtomicU64>,
}

/// Size of the control block rounded to the region alignment.
#[inline]
pub fn header_span() -> usize {
    let size = std::mem::size_of::<ChannelHeader>();
    (size + 127) & !127
}
