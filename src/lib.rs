// Module naming follows project convention (capitalised layer modules)
#[allow(non_snake_case)]
pub mod Core {
    pub mod SharedMemory;
    pub use SharedMemory::{
        attach_shared_memory, create_shared_memory, heap_region, RawHandle, RegionBackend,
    };
    pub mod alloc;
    pub mod clock;
    pub mod futex;
    pub mod shard;
    pub use alloc::{ChunkId, ChunkIdAllocator};
    pub use shard::ShardId;
}

#[allow(non_snake_case)]
pub mod Channel;

#[allow(non_snake_case)]
pub mod Stream;

#[allow(non_snake_case)]
pub mod Signal;

#[allow(non_snake_case)]
pub mod Decode;

#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{AgentConfig, ChannelConfig, ConsumerConfig, StreamConfig};
pub use runtime::{Invocation, ProbeRuntime};
