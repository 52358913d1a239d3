use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Degradation counters shared by every invocation of one runtime.
///
/// Drops are silent on the wire; these counters are the only trace they
/// leave.
#[derive(Debug, Default)]
pub struct StreamStats {
    pub chunks_committed: CachePadded<AtomicU64>,
    pub chunks_discarded: CachePadded<AtomicU64>,
    /// Chunk reservations refused because the byte channel was full.
    pub chunk_reserve_failures: AtomicU64,
    pub copies_truncated: AtomicU64,
    pub copies_failed: AtomicU64,
    pub fields_unavailable: AtomicU64,
    pub records_submitted: AtomicU64,
    /// Records dropped because the record channel was full.
    pub records_dropped: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunks_committed: u64,
    pub chunks_discarded: u64,
    pub chunk_reserve_failures: u64,
    pub copies_truncated: u64,
    pub copies_failed: u64,
    pub fields_unavailable: u64,
    pub records_submitted: u64,
    pub records_dropped: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks_committed: self.chunks_committed.load(Ordering::Relaxed),
            chunks_discarded: self.chunks_discarded.load(Ordering::Relaxed),
            chunk_reserve_failures: self.chunk_reserve_failures.load(Ordering::Relaxed),
            copies_truncated: self.copies_truncated.load(Ordering::Relaxed),
            copies_failed: self.copies_failed.load(Ordering::Relaxed),
            fields_unavailable: self.fields_unavailable.load(Ordering::Relaxed),
            records_submitted: self.records_submitted.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }
}
