// Segmented copy engine: spreads a source range over a chain of chunks.
//
// At most two reservations are open at once, and only across the hand-off
// from one chunk to the next: the successor is reserved and filled from the
// scratch buffer, its id is linked into the predecessor, and the
// predecessor is committed. No source read happens while two are open.

use super::chunk::{SizeClass, MAX_CHUNK_PAYLOAD};
use super::source::{SourceReader, TrustDomain};
use super::stats::StreamStats;
use super::writer::ChunkWriter;
use super::MAX_CHUNKS_LIMIT;
use crate::config::StreamConfig;
use crate::error::SourceFault;
use crate::Core::ChunkId;

/// How a copy ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CopyStatus {
    /// Every source byte is in the chain.
    Success,
    /// The chain holds a prefix of the source and ends with `next == 0`.
    Truncated,
    /// No usable chain; the head is 0.
    Failed,
}

impl CopyStatus {
    pub fn code(self) -> u8 {
        match self {
            CopyStatus::Success => 0,
            CopyStatus::Truncated => 1,
            CopyStatus::Failed => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CopyStatus::Success),
            1 => Some(CopyStatus::Truncated),
            2 => Some(CopyStatus::Failed),
            _ => None,
        }
    }
}

/// Why a copy did not fully succeed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CopyFailure {
    /// Null address, zero length, or an unusable chunk class. Nothing was
    /// reserved.
    InvalidRequest,
    /// The byte channel refused a chunk reservation.
    Capacity,
    /// A source read faulted.
    Source(SourceFault),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CopyOutcome {
    /// First chunk of the chain, or [`ChunkId::NONE`].
    pub head: ChunkId,
    /// Source bytes stored in committed chunks. Excludes any terminator.
    pub copied: usize,
    /// Chunks committed by this copy.
    pub chunks: usize,
    pub status: CopyStatus,
    /// Set for `Failed`, and for `Truncated` caused by a full channel.
    pub failure: Option<CopyFailure>,
}

impl CopyOutcome {
    fn success(head: ChunkId, copied: usize, chunks: usize) -> Self {
        Self {
            head,
            copied,
            chunks,
            status: CopyStatus::Success,
            failure: None,
        }
    }

    fn failed(failure: CopyFailure, copied: usize, chunks: usize) -> Self {
        Self {
            head: ChunkId::NONE,
            copied,
            chunks,
            status: CopyStatus::Failed,
            failure: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CopyStatus::Success
    }
}

/// Where the next segment comes from.
enum Cursor {
    /// Exactly `remaining` more bytes.
    Bytes { remaining: usize },
    /// Up to the next NUL.
    Str,
}

struct Segment {
    len: usize,
    /// Nothing follows this segment.
    last: bool,
}

impl Cursor {
    fn read<S: SourceReader + ?Sized>(
        &mut self,
        src: &S,
        addr: u64,
        buf: &mut [u8],
        trust: TrustDomain,
    ) -> Result<Segment, SourceFault> {
        match self {
            Cursor::Bytes { remaining } => {
                let len = (*remaining).min(buf.len());
                src.read_bytes(addr, &mut buf[..len], trust)?;
                *remaining -= len;
                Ok(Segment {
                    len,
                    last: *remaining == 0,
                })
            }
            Cursor::Str => {
                let read = src.read_cstr(addr, buf, trust)?;
                Ok(Segment {
                    len: read.len,
                    last: read.terminated,
                })
            }
        }
    }

    /// Whether a full segment proves more data follows.
    fn is_exact(&self) -> bool {
        matches!(self, Cursor::Bytes { .. })
    }
}

impl<'a> ChunkWriter<'a> {
    /// Copy exactly `len` bytes starting at `addr`.
    pub fn copy_bytes<S: SourceReader + ?Sized>(
        &self,
        src: &S,
        addr: u64,
        len: usize,
        trust: TrustDomain,
        config: &StreamConfig,
    ) -> CopyOutcome {
        if len == 0 {
            return self.reject();
        }
        let class = config.byte_chunk.unwrap_or_else(|| SizeClass::for_len(len));
        self.copy_segments(
            src,
            addr,
            Cursor::Bytes { remaining: len },
            trust,
            class,
            config.max_chunks,
        )
    }

    /// Copy the NUL-terminated string at `addr`, terminator excluded.
    ///
    /// An empty string succeeds with no chunks and a head of 0.
    pub fn copy_nul_terminated_string<S: SourceReader + ?Sized>(
        &self,
        src: &S,
        addr: u64,
        trust: TrustDomain,
        config: &StreamConfig,
    ) -> CopyOutcome {
        self.copy_segments(
            src,
            addr,
            Cursor::Str,
            trust,
            config.string_chunk,
            config.max_chunks,
        )
    }

    fn reject(&self) -> CopyOutcome {
        StreamStats::bump(&self.stats.copies_failed);
        log::debug!("shard {}: copy rejected: invalid request", self.shard);
        CopyOutcome::failed(CopyFailure::InvalidRequest, 0, 0)
    }

    fn copy_segments<S: SourceReader + ?Sized>(
        &self,
        src: &S,
        addr: u64,
        mut cursor: Cursor,
        trust: TrustDomain,
        class: SizeClass,
        max_chunks: usize,
    ) -> CopyOutcome {
        if addr == 0 || max_chunks == 0 || !class.is_valid() {
            return self.reject();
        }
        let max_chunks = max_chunks.min(MAX_CHUNKS_LIMIT);
        let capacity = class.payload_capacity();
        let mut scratch = [0u8; MAX_CHUNK_PAYLOAD];
        let scratch = &mut scratch[..capacity];

        let first = match cursor.read(src, addr, scratch, trust) {
            Ok(seg) => seg,
            Err(fault) => return self.fail(CopyFailure::Source(fault), 0, 0),
        };
        if first.len == 0 {
            return CopyOutcome::success(ChunkId::NONE, 0, 0);
        }

        let mut current = match self.open(class) {
            Ok(chunk) => chunk,
            Err(_) => return self.fail(CopyFailure::Capacity, 0, 0),
        };
        current.fill(&scratch[..first.len]);

        let head = current.id();
        let mut copied = first.len;
        let mut chunks = 1;
        let mut last = first.last;

        loop {
            if last {
                current.commit();
                return CopyOutcome::success(head, copied, chunks);
            }
            if chunks == max_chunks && cursor.is_exact() {
                current.commit();
                return self.truncate(head, copied, chunks, None);
            }

            // A string that filled the previous chunk exactly ends here
            // when the read-ahead comes back empty.
            let Some(next_addr) = addr.checked_add(copied as u64) else {
                current.commit();
                let fault = SourceFault::Unmapped { addr };
                return self.fail(CopyFailure::Source(fault), copied, chunks);
            };
            let seg = match cursor.read(src, next_addr, scratch, trust) {
                Ok(seg) => seg,
                Err(fault) => {
                    // Committed chunks stay consistent: the chain just ends.
                    current.commit();
                    return self.fail(CopyFailure::Source(fault), copied, chunks);
                }
            };
            if seg.len == 0 {
                current.commit();
                return CopyOutcome::success(head, copied, chunks);
            }
            if chunks == max_chunks {
                current.commit();
                return self.truncate(head, copied, chunks, None);
            }

            let mut next = match self.open(class) {
                Ok(chunk) => chunk,
                Err(_) => {
                    current.commit();
                    return self.truncate(head, copied, chunks, Some(CopyFailure::Capacity));
                }
            };
            next.fill(&scratch[..seg.len]);
            current.link(next.id());
            current.commit();

            current = next;
            copied += seg.len;
            chunks += 1;
            last = seg.last;
        }
    }

    fn fail(&self, failure: CopyFailure, copied: usize, chunks: usize) -> CopyOutcome {
        StreamStats::bump(&self.stats.copies_failed);
        log::debug!(
            "shard {}: copy failed ({:?}) after {} chunks",
            self.shard,
            failure,
            chunks
        );
        CopyOutcome::failed(failure, copied, chunks)
    }

    fn truncate(
        &self,
        head: ChunkId,
        copied: usize,
        chunks: usize,
        failure: Option<CopyFailure>,
    ) -> CopyOutcome {
        StreamStats::bump(&self.stats.copies_truncated);
        log::debug!(
            "shard {}: copy truncated at {} bytes in {} chunks",
            self.shard,
            copied,
            chunks
        );
        CopyOutcome {
            head,
            copied,
            chunks,
            status: CopyStatus::Truncated,
            failure,
        }
    }
}
