use crate::error::DecodeError;
use crate::Stream::{CopyStatus, StringField, StringFieldWire};
use crate::Core::ChunkId;
use bytemuck::{Pod, Zeroable};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub euid: u32,
    pub egid: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub tgid: u32,
    /// Pid inside the task's own pid namespace.
    pub pid_vnr: u32,
    /// Inode number of the pid namespace.
    pub pid_ns: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ParentIdentity {
    pub pid: u32,
    pub tgid: u32,
    pub start_time: u64,
}

/// Reference to a raw byte block copied into a chunk chain.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockRef {
    /// 0 when nothing usable was copied.
    pub head: ChunkId,
    pub status: CopyStatus,
}

impl Default for BlockRef {
    fn default() -> Self {
        Self {
            head: ChunkId::NONE,
            status: CopyStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecInfo {
    pub filename: StringField,
    pub interp: StringField,
    pub args: BlockRef,
    pub env: BlockRef,
    pub cgroup_id: u64,
}

/// A process that just executed a new program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskExecRecord {
    pub creds: Credentials,
    pub pid: ProcessIdentity,
    pub parent: ParentIdentity,
    pub login_uid: u32,
    pub session_id: u32,
    /// Boot-clock start time of the process.
    pub start_time: u64,
    pub exec: ExecInfo,
}

/// Snapshot of one live cgroup.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CgroupSnapshot {
    pub cgroup_id: u64,
}

/// Wire body of a task-exec record, 368 bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TaskExecWire {
    pub creds: Credentials,
    pub pid: ProcessIdentity,
    pub parent: ParentIdentity,
    pub login_uid: u32,
    pub session_id: u32,
    pub start_time: u64,
    pub filename: StringFieldWire,
    pub interp: StringFieldWire,
    pub args_head: u64,
    pub env_head: u64,
    pub args_status: u8,
    pub env_status: u8,
    pub _pad: [u8; 6],
    pub cgroup_id: u64,
}

impl TaskExecRecord {
    pub fn to_wire(&self) -> TaskExecWire {
        TaskExecWire {
            creds: self.creds,
            pid: self.pid,
            parent: self.parent,
            login_uid: self.login_uid,
            session_id: self.session_id,
            start_time: self.start_time,
            filename: self.exec.filename.to_wire(),
            interp: self.exec.interp.to_wire(),
            args_head: self.exec.args.head.raw(),
            env_head: self.exec.env.head.raw(),
            args_status: self.exec.args.status.code(),
            env_status: self.exec.env.status.code(),
            _pad: [0; 6],
            cgroup_id: self.exec.cgroup_id,
        }
    }

    pub fn from_wire(wire: &TaskExecWire) -> Result<Self, DecodeError> {
        let status = |code| CopyStatus::from_code(code).ok_or(DecodeError::CopyStatus(code));
        Ok(Self {
            creds: wire.creds,
            pid: wire.pid,
            parent: wire.parent,
            login_uid: wire.login_uid,
            session_id: wire.session_id,
            start_time: wire.start_time,
            exec: ExecInfo {
                filename: StringField::from_wire(&wire.filename)?,
                interp: StringField::from_wire(&wire.interp)?,
                args: BlockRef {
                    head: ChunkId(wire.args_head),
                    status: status(wire.args_status)?,
                },
                env: BlockRef {
                    head: ChunkId(wire.env_head),
                    status: status(wire.env_status)?,
                },
                cgroup_id: wire.cgroup_id,
            },
        })
    }
}
