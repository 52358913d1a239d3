use std::io;
use std::ptr;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use super::layout::{
    header_span, record_span, ChannelHeader, BUSY_BIT, CHANNEL_MAGIC, CHANNEL_VERSION,
    DISCARD_BIT, FLAG_NOTIFY, LEN_MASK, MIN_CAPACITY, RECORD_HEADER_LEN,
};
use super::Ring::{Reservation, RingChannel};
use crate::error::ReserveError;
use crate::Core::{futex, RegionBackend};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

impl RingChannel {
    /// Lay out a fresh channel over `region`.
    pub(crate) fn initialize(
        region: Box<dyn RegionBackend>,
        capacity: usize,
        flags: u32,
        name: Option<String>,
    ) -> io::Result<Self> {
        if capacity < MIN_CAPACITY || !capacity.is_power_of_two() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "capacity must be a power of two and at least {} bytes, got {}",
                    MIN_CAPACITY, capacity
                ),
            ));
        }

        let data_offset = header_span();
        if region.size() < data_offset + capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "region too small: {} bytes, need {}",
                    region.size(),
                    data_offset + capacity
                ),
            ));
        }

        let header = region.as_ptr() as *mut ChannelHeader;
        unsafe {
            ptr::write(
                header,
                ChannelHeader {
                    magic: CHANNEL_MAGIC,
                    version: CHANNEL_VERSION,
                    flags,
                    capacity: capacity as u64,
                    data_offset: data_offset as u64,
                    signal: AtomicU32::new(0),
                    waiters: AtomicU32::new(0),
                    producer_pos: CachePadded::new(Default::default()),
                    consumer_pos: CachePadded::new(Default::default()),
                },
            );
        }

        Ok(Self::view(region, header, capacity, data_offset, name))
    }

    /// Open a view over a region that already holds an initialised channel.
    pub(crate) fn from_existing(
        region: Box<dyn RegionBackend>,
        name: Option<String>,
    ) -> io::Result<Self> {
        if region.size() < header_span() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "region too small for channel header",
            ));
        }

        let header = region.as_ptr() as *mut ChannelHeader;
        let (magic, version, capacity, data_offset) = unsafe {
            let h = &*header;
            (h.magic, h.version, h.capacity as usize, h.data_offset as usize)
        };

        if magic != CHANNEL_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid magic number - channel not initialized",
            ));
        }
        if version != CHANNEL_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported channel version {}", version),
            ));
        }
        if !capacity.is_power_of_two() || region.size() < data_offset + capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "channel header describes a band outside the region",
            ));
        }

        Ok(Self::view(region, header, capacity, data_offset, name))
    }

    fn view(
        region: Box<dyn RegionBackend>,
        header: *const ChannelHeader,
        capacity: usize,
        data_offset: usize,
        name: Option<String>,
    ) -> Self {
        let data = unsafe { region.as_ptr().add(data_offset) };
        Self {
            region,
            header,
            data,
            capacity,
            mask: capacity - 1,
            name,
            reserve_lock: Mutex::new(()),
            consumer_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub(crate) fn header(&self) -> &ChannelHeader {
        // Valid for as long as `region` is mapped, which is as long as self.
        unsafe { &*self.header }
    }

    /// Header word of the record starting at `offset` in the band.
    ///
    /// # Safety
    /// `offset` must be 8-aligned and inside the band.
    #[inline]
    pub(crate) unsafe fn record_word(&self, offset: usize) -> &AtomicU32 {
        &*(self.data.add(offset) as *const AtomicU32)
    }

    /// Data band size in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest payload a single reservation may ask for.
    ///
    /// A quarter of the band, so a record always fits once the consumer
    /// catches up, wherever the cursor sits.
    pub fn max_record_len(&self) -> usize {
        (self.capacity / 4 - RECORD_HEADER_LEN).min(LEN_MASK as usize)
    }

    /// Bytes reserved and not yet consumed, padding included.
    pub fn used_bytes(&self) -> usize {
        let h = self.header();
        let prod = h.producer_pos.load(Acquire);
        let cons = h.consumer_pos.load(Acquire);
        prod.saturating_sub(cons) as usize
    }

    pub fn free_bytes(&self) -> usize {
        self.capacity - self.used_bytes()
    }

    /// Shared-memory name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Reserve `size` payload bytes.
    ///
    /// Never blocks on a full channel: `Full` is returned and the caller
    /// degrades. The returned record stays invisible to the consumer, and
    /// holds back every later record, until it is finalized.
    pub fn reserve(&self, size: usize) -> Result<Reservation<'_>, ReserveError> {
        let max = self.max_record_len();
        if size == 0 || size > max {
            return Err(ReserveError::InvalidSize { size, max });
        }

        let span = record_span(size);
        let h = self.header();

        let _guard = self.reserve_lock.lock();
        let cons = h.consumer_pos.load(Acquire);
        let prod = h.producer_pos.load(Relaxed);
        let used = prod.saturating_sub(cons) as usize;

        let offset = (prod as usize) & self.mask;
        let pad = if offset + span > self.capacity {
            self.capacity - offset
        } else {
            0
        };

        if used + pad + span > self.capacity {
            return Err(ReserveError::Full {
                requested: size,
                available: self.capacity - used,
            });
        }

        unsafe {
            if pad > 0 {
                // Records never wrap: fill the tail with a skipped record.
                self.record_word(offset)
                    .store((pad - RECORD_HEADER_LEN) as u32 | DISCARD_BIT, Relaxed);
            }
            let record = (offset + pad) & self.mask;
            self.record_word(record).store(size as u32 | BUSY_BIT, Relaxed);
            h.producer_pos.store(prod + (pad + span) as u64, Release);

            Ok(Reservation {
                ring: self,
                record,
                len: size,
                finalized: false,
            })
        }
    }

    fn finalize(&self, record: usize, len: usize, discard: bool) {
        let word = if discard {
            len as u32 | DISCARD_BIT
        } else {
            len as u32
        };
        unsafe { self.record_word(record) }.store(word, Release);

        let h = self.header();
        if h.flags & FLAG_NOTIFY != 0 {
            futex::notify(&h.signal, &h.waiters);
        }
    }
}

impl<'a> Reservation<'a> {
    /// Payload bytes reserved.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writable view of the reserved payload.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // The record is BUSY: no consumer reads it and no other producer
        // was handed this range.
        unsafe {
            std::slice::from_raw_parts_mut(
                self.ring.data.add(self.record + RECORD_HEADER_LEN),
                self.len,
            )
        }
    }

    /// Make the record visible to the consumer.
    pub fn commit(mut self) {
        self.finalized = true;
        self.ring.finalize(self.record, self.len, false);
    }

    /// Release the space without making the record visible.
    pub fn discard(mut self) {
        self.finalized = true;
        self.ring.finalize(self.record, self.len, true);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.finalized {
            log::warn!(
                "reservation of {} bytes dropped without finalize; discarding",
                self.len
            );
            self.ring.finalize(self.record, self.len, true);
        }
    }
}
