use crate::Core::ChunkId;
use thiserror::Error;

/// Why a channel reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReserveError {
    /// Not enough free space right now. A normal outcome under pressure.
    #[error("channel full: requested {requested} bytes, {available} free")]
    Full { requested: usize, available: usize },

    /// Zero-length or larger than the channel could ever hold.
    #[error("invalid reservation size {size} (max {max})")]
    InvalidSize { size: usize, max: usize },
}

/// A source read that could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SourceFault {
    #[error("null source address")]
    Null,

    #[error("unreadable source byte at {addr:#x}")]
    Unmapped { addr: u64 },

    #[error("address {addr:#x} is outside the requested trust domain")]
    WrongDomain { addr: u64 },

    #[error("field not available on this source")]
    FieldUnavailable,
}

/// Malformed bytes handed to a decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("short buffer: need {need} bytes, got {got}")]
    Short { need: usize, got: usize },

    #[error("unsupported format version {0}")]
    Version(u8),

    #[error("unknown record type {0}")]
    RecordType(u8),

    #[error("unknown chunk size class {0}")]
    SizeClass(u8),

    #[error("unknown string field tag {0}")]
    FieldTag(u8),

    #[error("unknown copy status {0}")]
    CopyStatus(u8),

    #[error("effective length {len} exceeds payload capacity {capacity}")]
    Length { len: usize, capacity: usize },

    #[error("inline string of {0} bytes is not NUL-terminated")]
    Unterminated(usize),
}

/// A chunk chain that could not be reassembled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chunk {0} is missing (dropped, evicted, or not yet received)")]
    Missing(ChunkId),

    #[error("chunk {next} linked from shard {from} belongs to another shard")]
    ShardMismatch { from: u16, next: ChunkId },

    #[error("chain exceeds {0} chunks")]
    TooLong(usize),
}

/// Configuration that could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
