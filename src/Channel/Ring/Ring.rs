// Bounded byte ring shared by many producers and drained by one consumer.

use super::layout::ChannelHeader;
use crate::Core::RegionBackend;
use parking_lot::Mutex;

/// A bounded, variable-record ring channel.
///
/// ### Concurrency Design:
/// - **Producers** reserve space under a short lock that only moves the
///   producer cursor and stamps a BUSY record header. Filling and
///   finalizing the record happens outside the lock.
/// - **The consumer** walks records in reservation order and stops at the
///   first one still BUSY. A reservation left open therefore hides every
///   record reserved after it, whichever producer made them.
pub struct RingChannel {
    /// Keeps the backing memory mapped.
    pub(crate) region: Box<dyn RegionBackend>,

    /// Control block at the start of the region.
    pub(crate) header: *const ChannelHeader,

    /// Start of the data band.
    pub(crate) data: *mut u8,

    /// Data band size in bytes (power of two).
    pub(crate) capacity: usize,

    /// `capacity - 1`.
    pub(crate) mask: usize,

    /// `/dev/shm` name when the channel is shared.
    pub(crate) name: Option<String>,

    pub(crate) reserve_lock: Mutex<()>,
    pub(crate) consumer_lock: Mutex<()>,
}

unsafe impl Send for RingChannel {}
unsafe impl Sync for RingChannel {}

/// Space reserved in a [`RingChannel`], writable only through this handle.
///
/// Must end in [`Reservation::commit`] or [`Reservation::discard`]; dropping
/// it unfinalized discards it.
pub struct Reservation<'a> {
    pub(crate) ring: &'a RingChannel,
    /// Offset of the record header in the data band.
    pub(crate) record: usize,
    pub(crate) len: usize,
    pub(crate) finalized: bool,
}

// Debug proxy implementations that call the standalone debug functions
impl std::fmt::Debug for RingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_ring_channel(self, f)
    }
}

impl std::fmt::Debug for Reservation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_reservation(self, f)
    }
}
