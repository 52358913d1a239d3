// Chunked streaming of variable-length payloads over a byte channel.

pub mod chunk;
pub mod copy;
pub mod field;
pub mod source;
pub mod stats;
pub mod writer;

/// Hard ceiling on the chunks one copy may commit. Configured caps are
/// clamped to it.
pub const MAX_CHUNKS_LIMIT: usize = 32;

pub use chunk::{decode_chunk, ChunkHeader, ChunkView, SizeClass, CHUNK_HEADER_LEN};
pub use copy::{CopyFailure, CopyOutcome, CopyStatus};
pub use field::{FieldKind, InlineStr, StringField, StringFieldWire, INLINE_CAPACITY};
pub use source::{
    CStrRead, MemorySource, SourceReader, TaskField, TaskHandle, TaskSnapshot, TaskSource,
    TrustDomain,
};
pub use stats::{StatsSnapshot, StreamStats};
pub use writer::{ChunkWriter, OpenChunk};
