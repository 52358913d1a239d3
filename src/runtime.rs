// Wiring shared by every probe: both channels, the id allocator, the copy
// knobs and the drop counters. One `Invocation` per probe firing.

use crate::config::{AgentConfig, StreamConfig};
use crate::Channel::{ChannelBuilder, RingChannel};
use crate::Core::shard::{current_shard, ShardId};
use crate::Core::ChunkIdAllocator;
use crate::Signal::RecordAssembler;
use crate::Stream::{ChunkWriter, StreamStats};
use std::io;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ProbeRuntime {
    chunks: Arc<RingChannel>,
    records: Arc<RingChannel>,
    ids: Arc<ChunkIdAllocator>,
    config: StreamConfig,
    stats: Arc<StreamStats>,
}

impl ProbeRuntime {
    /// Build both channels as `config` describes, heap- or shm-backed.
    pub fn new(config: &AgentConfig) -> io::Result<Self> {
        config
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let channels = &config.channels;
        let chunks = Self::channel(
            channels.chunk_capacity,
            channels.chunk_channel_name(),
            channels.notify,
        )?;
        let records = Self::channel(
            channels.record_capacity,
            channels.record_channel_name(),
            channels.notify,
        )?;

        log::info!(
            "probe runtime ready: chunk channel {} bytes, record channel {} bytes, max_chunks {}",
            chunks.capacity(),
            records.capacity(),
            config.stream.max_chunks
        );
        Ok(Self::from_parts(
            Arc::new(chunks),
            Arc::new(records),
            Arc::new(ChunkIdAllocator::per_cpu()),
            config.stream,
        ))
    }

    fn channel(capacity: usize, name: Option<String>, notify: bool) -> io::Result<RingChannel> {
        let mut builder = ChannelBuilder::new()
            .with_capacity(capacity)
            .with_notify(notify);
        if let Some(name) = name {
            builder = builder.with_shared_name(name);
        }
        builder.build()
    }

    pub fn from_parts(
        chunks: Arc<RingChannel>,
        records: Arc<RingChannel>,
        ids: Arc<ChunkIdAllocator>,
        config: StreamConfig,
    ) -> Self {
        Self {
            chunks,
            records,
            ids,
            config,
            stats: Arc::new(StreamStats::new()),
        }
    }

    /// Invocation tagged with the CPU the caller runs on now.
    pub fn invocation(&self) -> Invocation<'_> {
        self.invocation_on(current_shard())
    }

    /// Invocation with an explicit shard tag.
    pub fn invocation_on(&self, shard: ShardId) -> Invocation<'_> {
        Invocation {
            writer: ChunkWriter::new(&self.chunks, &self.ids, shard, &self.stats),
            records: &self.records,
            config: &self.config,
        }
    }

    pub fn chunk_channel(&self) -> &Arc<RingChannel> {
        &self.chunks
    }

    pub fn record_channel(&self) -> &Arc<RingChannel> {
        &self.records
    }

    pub fn allocator(&self) -> &ChunkIdAllocator {
        &self.ids
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }
}

/// One probe firing. Keeps its shard for its whole life.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    writer: ChunkWriter<'a>,
    records: &'a RingChannel,
    config: &'a StreamConfig,
}

impl<'a> Invocation<'a> {
    pub fn shard(&self) -> ShardId {
        self.writer.shard()
    }

    pub fn writer(&self) -> ChunkWriter<'a> {
        self.writer
    }

    pub fn config(&self) -> &'a StreamConfig {
        self.config
    }

    pub fn assembler(&self) -> RecordAssembler<'a> {
        RecordAssembler::new(self.writer, self.records, self.config)
    }
}
