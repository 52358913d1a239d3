use super::copy::CopyStatus;
use super::source::{SourceReader, TrustDomain};
use super::stats::StreamStats;
use super::writer::ChunkWriter;
use crate::config::StreamConfig;
use crate::error::DecodeError;
use crate::Core::ChunkId;
use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Inline buffer size, terminator included.
pub const INLINE_CAPACITY: usize = 128;

/// A string short enough to live inside the record: at most
/// `INLINE_CAPACITY - 1` bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InlineStr {
    len: u16,
    bytes: [u8; INLINE_CAPACITY],
}

impl InlineStr {
    /// `None` if `value` plus its terminator does not fit.
    pub fn new(value: &[u8]) -> Option<Self> {
        if value.len() >= INLINE_CAPACITY {
            return None;
        }
        let mut bytes = [0u8; INLINE_CAPACITY];
        bytes[..value.len()].copy_from_slice(value);
        Some(Self {
            len: value.len() as u16,
            bytes,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for InlineStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// A string field of a record. Exactly one representation is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StringField {
    Inline(InlineStr),
    /// The value lives in a chunk chain. `head` is never 0.
    Overflow {
        head: ChunkId,
        len: u64,
        /// The chain holds only a prefix of the value.
        truncated: bool,
    },
    /// Unreadable, absent, or could not be spilled.
    #[default]
    Unavailable,
}

/// Which representation [`ChunkWriter::encode_field`] chose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Inline,
    Overflow,
    Unavailable,
}

impl StringField {
    pub fn kind(&self) -> FieldKind {
        match self {
            StringField::Inline(_) => FieldKind::Inline,
            StringField::Overflow { .. } => FieldKind::Overflow,
            StringField::Unavailable => FieldKind::Unavailable,
        }
    }

    /// Chain head of an overflow field.
    pub fn chain_head(&self) -> Option<ChunkId> {
        match self {
            StringField::Overflow { head, .. } => Some(*head),
            _ => None,
        }
    }

    pub fn to_wire(&self) -> StringFieldWire {
        let mut wire = StringFieldWire::zeroed();
        match self {
            StringField::Inline(s) => {
                wire.tag = StringFieldWire::TAG_INLINE;
                wire.inline_len = s.len;
                wire.data = s.bytes;
            }
            StringField::Overflow {
                head,
                len,
                truncated,
            } => {
                wire.tag = StringFieldWire::TAG_OVERFLOW;
                wire.truncated = *truncated as u8;
                wire.data[..8].copy_from_slice(&head.raw().to_ne_bytes());
                wire.data[8..16].copy_from_slice(&len.to_ne_bytes());
            }
            StringField::Unavailable => wire.tag = StringFieldWire::TAG_UNAVAILABLE,
        }
        wire
    }

    pub fn from_wire(wire: &StringFieldWire) -> Result<Self, DecodeError> {
        match wire.tag {
            StringFieldWire::TAG_UNAVAILABLE => Ok(StringField::Unavailable),
            StringFieldWire::TAG_INLINE => {
                let len = wire.inline_len as usize;
                if len >= INLINE_CAPACITY {
                    return Err(DecodeError::Length {
                        len,
                        capacity: INLINE_CAPACITY - 1,
                    });
                }
                if wire.data[len] != 0 {
                    return Err(DecodeError::Unterminated(len));
                }
                InlineStr::new(&wire.data[..len])
                    .map(StringField::Inline)
                    .ok_or(DecodeError::Length {
                        len,
                        capacity: INLINE_CAPACITY - 1,
                    })
            }
            StringFieldWire::TAG_OVERFLOW => {
                let head = ChunkId(u64::from_ne_bytes(wire.word(0)));
                let len = u64::from_ne_bytes(wire.word(1));
                if head.is_none() {
                    // An overflow without a chain is never emitted.
                    return Err(DecodeError::FieldTag(wire.tag));
                }
                Ok(StringField::Overflow {
                    head,
                    len,
                    truncated: wire.truncated != 0,
                })
            }
            other => Err(DecodeError::FieldTag(other)),
        }
    }
}

/// Wire form of a [`StringField`], 136 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct StringFieldWire {
    pub tag: u8,
    pub truncated: u8,
    pub inline_len: u16,
    pub reserved: u32,
    /// Inline bytes and terminator, or `[head: u64][len: u64]`.
    pub data: [u8; INLINE_CAPACITY],
}

impl StringFieldWire {
    pub const TAG_UNAVAILABLE: u8 = 0;
    pub const TAG_INLINE: u8 = 1;
    pub const TAG_OVERFLOW: u8 = 2;

    fn word(&self, index: usize) -> [u8; 8] {
        let mut out = [0u8; 8];
        out.copy_from_slice(&self.data[index * 8..index * 8 + 8]);
        out
    }
}

impl Default for StringFieldWire {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<'a> ChunkWriter<'a> {
    /// Store the string at `addr` into `field`, inline if it fits and as a
    /// chunk chain otherwise.
    ///
    /// A failed spill leaves the field `Unavailable`, never a dangling head.
    pub fn encode_field<S: SourceReader + ?Sized>(
        &self,
        field: &mut StringField,
        src: &S,
        addr: u64,
        trust: TrustDomain,
        config: &StreamConfig,
    ) -> FieldKind {
        *field = self.encode_string(src, addr, trust, config);
        if *field == StringField::Unavailable {
            StreamStats::bump(&self.stats.fields_unavailable);
        }
        field.kind()
    }

    fn encode_string<S: SourceReader + ?Sized>(
        &self,
        src: &S,
        addr: u64,
        trust: TrustDomain,
        config: &StreamConfig,
    ) -> StringField {
        if addr == 0 {
            return StringField::Unavailable;
        }

        let mut buf = [0u8; INLINE_CAPACITY];
        let read = match src.read_cstr(addr, &mut buf, trust) {
            Ok(read) => read,
            Err(fault) => {
                log::debug!("shard {}: field unreadable: {}", self.shard, fault);
                return StringField::Unavailable;
            }
        };

        if read.terminated {
            // len < INLINE_CAPACITY whenever the terminator was found
            return InlineStr::new(&buf[..read.len])
                .map(StringField::Inline)
                .unwrap_or_default();
        }

        // Spill from the original address, not the inline prefix.
        let outcome = self.copy_nul_terminated_string(src, addr, trust, config);
        match outcome.status {
            CopyStatus::Success | CopyStatus::Truncated if !outcome.head.is_none() => {
                StringField::Overflow {
                    head: outcome.head,
                    len: outcome.copied as u64,
                    truncated: outcome.status == CopyStatus::Truncated,
                }
            }
            _ => StringField::Unavailable,
        }
    }
}
