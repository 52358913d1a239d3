// Self-framed records on the record channel:
// [SignalHeader (16 bytes)][body, layout chosen by the header's type tag]

pub mod assembler;
pub mod task;

use crate::error::DecodeError;
use crate::Core::ShardId;
use bytemuck::{Pod, Zeroable};

pub use assembler::{EmitOutcome, RecordAssembler};
pub use task::{
    BlockRef, CgroupSnapshot, Credentials, ExecInfo, ParentIdentity, ProcessIdentity,
    TaskExecRecord, TaskExecWire,
};

pub const SIGNAL_VERSION: u8 = 1;

pub const SIGNAL_HEADER_LEN: usize = std::mem::size_of::<SignalHeader>();

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SignalHeader {
    pub version: u8,
    /// [`SignalType`] discriminant.
    pub signal_type: u8,
    pub shard_id: u16,
    pub reserved: u32,
    /// Boot-clock time of submission.
    pub timestamp_ns: u64,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SignalType {
    TaskExec = 1,
    CgroupSnapshot = 2,
}

impl TryFrom<u8> for SignalType {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(SignalType::TaskExec),
            2 => Ok(SignalType::CgroupSnapshot),
            other => Err(DecodeError::RecordType(other)),
        }
    }
}

/// Record body, one variant per [`SignalType`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    TaskExec(Box<TaskExecRecord>),
    CgroupSnapshot(CgroupSnapshot),
}

impl Signal {
    pub fn signal_type(&self) -> SignalType {
        match self {
            Signal::TaskExec(_) => SignalType::TaskExec,
            Signal::CgroupSnapshot(_) => SignalType::CgroupSnapshot,
        }
    }

    /// Bytes this record occupies on the wire, header included.
    pub fn encoded_len(&self) -> usize {
        SIGNAL_HEADER_LEN
            + match self {
                Signal::TaskExec(_) => std::mem::size_of::<TaskExecWire>(),
                Signal::CgroupSnapshot(_) => std::mem::size_of::<u64>(),
            }
    }

    /// Write header and body into `out`, which must be exactly
    /// [`Signal::encoded_len`] bytes.
    pub fn encode_into(&self, shard_id: ShardId, timestamp_ns: u64, out: &mut [u8]) {
        let header = SignalHeader {
            version: SIGNAL_VERSION,
            signal_type: self.signal_type() as u8,
            shard_id,
            reserved: 0,
            timestamp_ns,
        };
        let (head, body) = out.split_at_mut(SIGNAL_HEADER_LEN);
        head.copy_from_slice(bytemuck::bytes_of(&header));
        match self {
            Signal::TaskExec(record) => body.copy_from_slice(bytemuck::bytes_of(&record.to_wire())),
            Signal::CgroupSnapshot(snap) => body.copy_from_slice(&snap.cgroup_id.to_ne_bytes()),
        }
    }

    pub fn encode(&self, shard_id: ShardId, timestamp_ns: u64) -> Vec<u8> {
        let mut out = vec![0u8; self.encoded_len()];
        self.encode_into(shard_id, timestamp_ns, &mut out);
        out
    }
}

/// A record read back off the record channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedSignal {
    pub header: SignalHeader,
    pub signal: Signal,
}

pub fn decode_signal(bytes: &[u8]) -> Result<DecodedSignal, DecodeError> {
    if bytes.len() < SIGNAL_HEADER_LEN {
        return Err(DecodeError::Short {
            need: SIGNAL_HEADER_LEN,
            got: bytes.len(),
        });
    }
    let header: SignalHeader = bytemuck::pod_read_unaligned(&bytes[..SIGNAL_HEADER_LEN]);
    if header.version != SIGNAL_VERSION {
        return Err(DecodeError::Version(header.version));
    }
    let body = &bytes[SIGNAL_HEADER_LEN..];

    let signal = match SignalType::try_from(header.signal_type)? {
        SignalType::TaskExec => {
            let need = std::mem::size_of::<TaskExecWire>();
            if body.len() < need {
                return Err(DecodeError::Short {
                    need: SIGNAL_HEADER_LEN + need,
                    got: bytes.len(),
                });
            }
            let wire: TaskExecWire = bytemuck::pod_read_unaligned(&body[..need]);
            Signal::TaskExec(Box::new(TaskExecRecord::from_wire(&wire)?))
        }
        SignalType::CgroupSnapshot => {
            let raw: [u8; 8] = body
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or(DecodeError::Short {
                    need: SIGNAL_HEADER_LEN + 8,
                    got: bytes.len(),
                })?;
            Signal::CgroupSnapshot(CgroupSnapshot {
                cgroup_id: u64::from_ne_bytes(raw),
            })
        }
    };

    Ok(DecodedSignal { header, signal })
}
