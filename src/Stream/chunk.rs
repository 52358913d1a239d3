// Chunk wire format. One chunk is one channel record:
// [ChunkHeader (24 bytes)][payload (payload_capacity bytes)]

use crate::error::DecodeError;
use crate::Core::ChunkId;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

pub const CHUNK_VERSION: u8 = 1;

pub const CHUNK_HEADER_LEN: usize = std::mem::size_of::<ChunkHeader>();

/// Largest payload any chunk may carry, and the size of the copy engine's
/// stack scratch buffer.
pub const MAX_CHUNK_PAYLOAD: usize = 4096 - CHUNK_HEADER_LEN;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ChunkHeader {
    pub version: u8,
    /// [`SizeClass::code`]
    pub size_class: u8,
    /// Meaningful payload bytes, never more than the payload capacity.
    pub effective_length: u16,
    pub reserved: u32,
    pub chunk_id: u64,
    /// Continuation chunk, or 0 for the last chunk of a chain.
    pub next_chunk_id: u64,
}

impl ChunkHeader {
    pub fn id(&self) -> ChunkId {
        ChunkId(self.chunk_id)
    }

    pub fn next(&self) -> ChunkId {
        ChunkId(self.next_chunk_id)
    }
}

/// Total chunk sizes the producer may reserve.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    /// 256-byte chunk.
    Small,
    /// 512-byte chunk.
    Medium,
    /// 1024-byte chunk.
    Large,
    /// Header plus the given payload capacity.
    Custom(u16),
}

impl SizeClass {
    pub const STANDARD: [SizeClass; 3] = [SizeClass::Small, SizeClass::Medium, SizeClass::Large];

    pub const CUSTOM_CODE: u8 = 0xFF;

    /// Bytes reserved in the channel for one chunk of this class.
    pub fn total_len(self) -> usize {
        match self {
            SizeClass::Small => 256,
            SizeClass::Medium => 512,
            SizeClass::Large => 1024,
            SizeClass::Custom(payload) => CHUNK_HEADER_LEN + payload as usize,
        }
    }

    pub fn payload_capacity(self) -> usize {
        self.total_len() - CHUNK_HEADER_LEN
    }

    pub fn code(self) -> u8 {
        match self {
            SizeClass::Small => 0,
            SizeClass::Medium => 1,
            SizeClass::Large => 2,
            SizeClass::Custom(_) => Self::CUSTOM_CODE,
        }
    }

    /// Class of a received chunk whose record is `total_len` bytes long.
    pub fn from_code(code: u8, total_len: usize) -> Result<Self, DecodeError> {
        let class = match code {
            0 => SizeClass::Small,
            1 => SizeClass::Medium,
            2 => SizeClass::Large,
            Self::CUSTOM_CODE => {
                let payload = total_len.saturating_sub(CHUNK_HEADER_LEN);
                if payload == 0 || payload > MAX_CHUNK_PAYLOAD {
                    return Err(DecodeError::Length {
                        len: payload,
                        capacity: MAX_CHUNK_PAYLOAD,
                    });
                }
                SizeClass::Custom(payload as u16)
            }
            other => return Err(DecodeError::SizeClass(other)),
        };
        if class.total_len() != total_len {
            return Err(DecodeError::Short {
                need: class.total_len(),
                got: total_len,
            });
        }
        Ok(class)
    }

    /// Smallest standard class whose payload holds `len` bytes, or `Large`.
    pub fn for_len(len: usize) -> Self {
        Self::STANDARD
            .into_iter()
            .find(|class| class.payload_capacity() >= len)
            .unwrap_or(SizeClass::Large)
    }

    /// Usable by the copy engine: non-empty and within the scratch buffer.
    pub fn is_valid(self) -> bool {
        let payload = self.payload_capacity();
        payload > 0 && payload <= MAX_CHUNK_PAYLOAD
    }
}

impl Default for SizeClass {
    fn default() -> Self {
        SizeClass::Large
    }
}

/// Borrowed view of a received chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkView<'a> {
    pub header: ChunkHeader,
    pub size_class: SizeClass,
    /// `payload[..effective_length]`
    pub data: &'a [u8],
}

/// Decode one chunk record as read off the byte channel.
pub fn decode_chunk(bytes: &[u8]) -> Result<ChunkView<'_>, DecodeError> {
    if bytes.len() < CHUNK_HEADER_LEN {
        return Err(DecodeError::Short {
            need: CHUNK_HEADER_LEN,
            got: bytes.len(),
        });
    }

    let header: ChunkHeader = bytemuck::pod_read_unaligned(&bytes[..CHUNK_HEADER_LEN]);
    if header.version != CHUNK_VERSION {
        return Err(DecodeError::Version(header.version));
    }

    let size_class = SizeClass::from_code(header.size_class, bytes.len())?;
    let len = header.effective_length as usize;
    let capacity = size_class.payload_capacity();
    if len > capacity {
        return Err(DecodeError::Length { len, capacity });
    }

    Ok(ChunkView {
        header,
        size_class,
        data: &bytes[CHUNK_HEADER_LEN..CHUNK_HEADER_LEN + len],
    })
}
