// Consumer side: collects chunks off the byte channel and rebuilds chains.
//
// Chunks of one chain are committed in chain order, but the record that
// references them may be read before all of them are drained. Chains are
// therefore validated in full before any chunk is removed, so a caller can
// drain more and retry after `ChainError::Missing`.

use crate::error::{ChainError, DecodeError};
use crate::Channel::RingChannel;
use crate::Core::ChunkId;
use crate::Signal::{BlockRef, TaskExecRecord};
use crate::Stream::{decode_chunk, CopyStatus, StringField, MAX_CHUNKS_LIMIT};
use std::collections::{HashMap, VecDeque};

struct StoredChunk {
    next: ChunkId,
    data: Vec<u8>,
}

/// The bytes of one chain, in order.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Reassembled {
    pub bytes: Vec<u8>,
    pub chunks: usize,
}

/// A string field or byte block with its chain resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedValue {
    Inline(Vec<u8>),
    Chain { bytes: Vec<u8>, truncated: bool },
    Unavailable,
    Broken(ChainError),
}

impl ResolvedValue {
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            ResolvedValue::Inline(b) => Some(b),
            ResolvedValue::Chain { bytes, .. } => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTask {
    pub filename: ResolvedValue,
    pub interp: ResolvedValue,
    pub args: ResolvedValue,
    pub env: ResolvedValue,
}

/// Bounded store of received chunks keyed by id.
pub struct ChunkStore {
    chunks: HashMap<ChunkId, StoredChunk>,
    /// Arrival order, for eviction. May hold ids already consumed.
    arrival: VecDeque<ChunkId>,
    max_pending: usize,
    evicted: u64,
    rejected: u64,
    duplicates: u64,
}

impl ChunkStore {
    pub fn new(max_pending: usize) -> Self {
        Self {
            chunks: HashMap::new(),
            arrival: VecDeque::new(),
            max_pending: max_pending.max(1),
            evicted: 0,
            rejected: 0,
            duplicates: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.chunks.contains_key(&id)
    }

    /// Chunks dropped to stay within `max_pending`.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Chunk records that failed to decode.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Chunks that arrived while a chunk with the same id was still stored.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Decode one chunk record and keep it.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<ChunkId, DecodeError> {
        let view = decode_chunk(bytes)?;
        let id = view.header.id();

        // The newer chunk replaces the stored one and takes its place in
        // arrival order.
        if self.chunks.remove(&id).is_some() {
            self.duplicates += 1;
            self.arrival.retain(|&old| old != id);
            log::warn!("duplicate chunk {:?} replaced", id);
        }

        while self.chunks.len() >= self.max_pending {
            match self.arrival.pop_front() {
                Some(old) => {
                    if self.chunks.remove(&old).is_some() {
                        self.evicted += 1;
                        log::debug!("evicted unreferenced chunk {:?}", old);
                    }
                }
                None => break,
            }
        }

        self.chunks.insert(
            id,
            StoredChunk {
                next: view.header.next(),
                data: view.data.to_vec(),
            },
        );
        self.arrival.push_back(id);
        if self.arrival.len() > self.max_pending * 2 {
            let chunks = &self.chunks;
            self.arrival.retain(|id| chunks.contains_key(id));
        }
        Ok(id)
    }

    /// Ingest every chunk currently readable on `channel`. Returns how many
    /// were stored.
    pub fn drain(&mut self, channel: &RingChannel) -> usize {
        let mut stored = 0;
        channel.drain_with(|bytes| match self.ingest(bytes) {
            Ok(_) => stored += 1,
            Err(e) => {
                self.rejected += 1;
                log::warn!("corrupt chunk on channel: {}", e);
            }
        });
        stored
    }

    /// Follow the chain from `head` and take its chunks out of the store.
    ///
    /// A head of 0 is an empty value. Nothing is removed unless the whole
    /// chain is present.
    pub fn reassemble(&mut self, head: ChunkId, max_chunks: usize) -> Result<Reassembled, ChainError> {
        if head.is_none() {
            return Ok(Reassembled::default());
        }

        let max_chunks = max_chunks.clamp(1, MAX_CHUNKS_LIMIT);
        let mut ids = Vec::new();
        let mut total = 0;
        let mut cursor = head;
        while !cursor.is_none() {
            if ids.len() == max_chunks {
                return Err(ChainError::TooLong(max_chunks));
            }
            if cursor.shard() != head.shard() {
                return Err(ChainError::ShardMismatch {
                    from: head.shard(),
                    next: cursor,
                });
            }
            let chunk = self.chunks.get(&cursor).ok_or(ChainError::Missing(cursor))?;
            ids.push(cursor);
            total += chunk.data.len();
            cursor = chunk.next;
        }

        let mut bytes = Vec::with_capacity(total);
        for id in &ids {
            if let Some(chunk) = self.chunks.remove(id) {
                bytes.extend_from_slice(&chunk.data);
            }
        }
        Ok(Reassembled {
            bytes,
            chunks: ids.len(),
        })
    }

    fn resolve_field(&mut self, field: &StringField, max_chunks: usize) -> ResolvedValue {
        match field {
            StringField::Inline(s) => ResolvedValue::Inline(s.as_bytes().to_vec()),
            StringField::Overflow {
                head, truncated, ..
            } => self.resolve_chain(*head, *truncated, max_chunks),
            StringField::Unavailable => ResolvedValue::Unavailable,
        }
    }

    fn resolve_block(&mut self, block: &BlockRef, max_chunks: usize) -> ResolvedValue {
        self.resolve_chain(block.head, block.status == CopyStatus::Truncated, max_chunks)
    }

    fn resolve_chain(&mut self, head: ChunkId, truncated: bool, max_chunks: usize) -> ResolvedValue {
        if head.is_none() {
            return ResolvedValue::Unavailable;
        }
        match self.reassemble(head, max_chunks) {
            Ok(r) => ResolvedValue::Chain {
                bytes: r.bytes,
                truncated,
            },
            Err(e) => ResolvedValue::Broken(e),
        }
    }

    /// Resolve every chain a task-exec record references.
    pub fn resolve_task(&mut self, record: &TaskExecRecord, max_chunks: usize) -> ResolvedTask {
        ResolvedTask {
            filename: self.resolve_field(&record.exec.filename, max_chunks),
            interp: self.resolve_field(&record.exec.interp, max_chunks),
            args: self.resolve_block(&record.exec.args, max_chunks),
            env: self.resolve_block(&record.exec.env, max_chunks),
        }
    }
}
