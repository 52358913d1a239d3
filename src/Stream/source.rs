// Source capability: where captured bytes come from.
//
// Probes read from two address spaces. Reads may fail at any byte, and a
// read never crosses into the other domain.

use crate::error::SourceFault;
use std::collections::{BTreeMap, HashMap};

/// Address space a read targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrustDomain {
    /// The observed process (user memory). Untrusted.
    Monitored,
    /// The collector's own address space (kernel memory). Trusted.
    Collector,
}

/// Result of a bounded string read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CStrRead {
    /// Bytes stored in the buffer, terminator excluded.
    pub len: usize,
    /// A NUL was found within the buffer's length.
    pub terminated: bool,
}

pub trait SourceReader {
    /// Fill `buf` from `addr`. All or nothing.
    fn read_bytes(&self, addr: u64, buf: &mut [u8], trust: TrustDomain) -> Result<(), SourceFault>;

    /// Copy bytes from `addr` into `buf` until a NUL or until `buf` is full.
    /// The NUL itself is not stored. Bytes past the NUL are never touched.
    fn read_cstr(
        &self,
        addr: u64,
        buf: &mut [u8],
        trust: TrustDomain,
    ) -> Result<CStrRead, SourceFault>;
}

/// Opaque handle of a task known to a [`TaskSource`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

/// Scalar attributes the record assembler reads from a task.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskField {
    Uid,
    Gid,
    Euid,
    Egid,
    Pid,
    Tgid,
    /// Pid as seen from the task's own pid namespace.
    PidVnr,
    PidNamespace,
    ParentPid,
    ParentTgid,
    ParentStartTime,
    LoginUid,
    SessionId,
    StartTime,
    /// Collector-space address of the executed file's path.
    FilenamePtr,
    /// Collector-space address of the interpreter path, 0 if none.
    InterpPtr,
    ArgStart,
    ArgEnd,
    EnvStart,
    EnvEnd,
    CgroupId,
}

/// Field-read capability on top of memory reads.
pub trait TaskSource: SourceReader {
    fn read_field(&self, task: TaskHandle, field: TaskField) -> Result<u64, SourceFault>;
}

#[derive(Debug)]
struct Region {
    bytes: Vec<u8>,
    trust: TrustDomain,
}

/// Simulated address space made of mapped regions.
///
/// Every byte outside a region is unmapped. Regions of different trust
/// domains may sit side by side; a read that reaches into the wrong one
/// faults.
#[derive(Debug, Default)]
pub struct MemorySource {
    regions: BTreeMap<u64, Region>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bytes` at `addr`, replacing any region that starts there.
    pub fn map(&mut self, addr: u64, bytes: impl Into<Vec<u8>>, trust: TrustDomain) {
        self.regions.insert(
            addr,
            Region {
                bytes: bytes.into(),
                trust,
            },
        );
    }

    /// Map `s` followed by a NUL at `addr`.
    pub fn map_cstr(&mut self, addr: u64, s: &[u8], trust: TrustDomain) {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s);
        bytes.push(0);
        self.map(addr, bytes, trust);
    }

    pub fn unmap(&mut self, addr: u64) -> bool {
        self.regions.remove(&addr).is_some()
    }

    /// Readable bytes starting at `addr` within a single region.
    fn span(&self, addr: u64, trust: TrustDomain) -> Result<&[u8], SourceFault> {
        let (start, region) = self
            .regions
            .range(..=addr)
            .next_back()
            .ok_or(SourceFault::Unmapped { addr })?;
        let offset = (addr - start) as usize;
        if offset >= region.bytes.len() {
            return Err(SourceFault::Unmapped { addr });
        }
        if region.trust != trust {
            return Err(SourceFault::WrongDomain { addr });
        }
        Ok(&region.bytes[offset..])
    }
}

impl SourceReader for MemorySource {
    fn read_bytes(&self, addr: u64, buf: &mut [u8], trust: TrustDomain) -> Result<(), SourceFault> {
        if addr == 0 {
            return Err(SourceFault::Null);
        }
        let mut done = 0;
        while done < buf.len() {
            let cursor = addr
                .checked_add(done as u64)
                .ok_or(SourceFault::Unmapped { addr })?;
            let span = self.span(cursor, trust)?;
            let n = span.len().min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&span[..n]);
            done += n;
        }
        Ok(())
    }

    fn read_cstr(
        &self,
        addr: u64,
        buf: &mut [u8],
        trust: TrustDomain,
    ) -> Result<CStrRead, SourceFault> {
        if addr == 0 {
            return Err(SourceFault::Null);
        }
        let mut done = 0;
        while done < buf.len() {
            let cursor = addr
                .checked_add(done as u64)
                .ok_or(SourceFault::Unmapped { addr })?;
            let span = self.span(cursor, trust)?;
            let n = span.len().min(buf.len() - done);
            if let Some(nul) = span[..n].iter().position(|&b| b == 0) {
                buf[done..done + nul].copy_from_slice(&span[..nul]);
                return Ok(CStrRead {
                    len: done + nul,
                    terminated: true,
                });
            }
            buf[done..done + n].copy_from_slice(&span[..n]);
            done += n;
        }
        Ok(CStrRead {
            len: done,
            terminated: false,
        })
    }
}

/// A [`MemorySource`] plus per-task scalar fields.
#[derive(Debug, Default)]
pub struct TaskSnapshot {
    pub memory: MemorySource,
    fields: HashMap<(TaskHandle, TaskField), u64>,
}

impl TaskSnapshot {
    pub fn new(memory: MemorySource) -> Self {
        Self {
            memory,
            fields: HashMap::new(),
        }
    }

    pub fn set_field(&mut self, task: TaskHandle, field: TaskField, value: u64) -> &mut Self {
        self.fields.insert((task, field), value);
        self
    }

    pub fn clear_field(&mut self, task: TaskHandle, field: TaskField) {
        self.fields.remove(&(task, field));
    }
}

impl SourceReader for TaskSnapshot {
    fn read_bytes(&self, addr: u64, buf: &mut [u8], trust: TrustDomain) -> Result<(), SourceFault> {
        self.memory.read_bytes(addr, buf, trust)
    }

    fn read_cstr(
        &self,
        addr: u64,
        buf: &mut [u8],
        trust: TrustDomain,
    ) -> Result<CStrRead, SourceFault> {
        self.memory.read_cstr(addr, buf, trust)
    }
}

impl TaskSource for TaskSnapshot {
    fn read_field(&self, task: TaskHandle, field: TaskField) -> Result<u64, SourceFault> {
        self.fields
            .get(&(task, field))
            .copied()
            .ok_or(SourceFault::FieldUnavailable)
    }
}
