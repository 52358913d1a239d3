use super::task::{
    BlockRef, CgroupSnapshot, Credentials, ExecInfo, ParentIdentity, ProcessIdentity,
    TaskExecRecord,
};
use super::Signal;
use crate::config::StreamConfig;
use crate::Channel::RingChannel;
use crate::Core::clock;
use crate::Stream::{
    ChunkWriter, CopyOutcome, StreamStats, StringField, TaskField, TaskHandle, TaskSource,
    TrustDomain,
};

/// Result of one emit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmitOutcome {
    Submitted,
    /// The record channel had no room. Chunks already written for the
    /// record stay in the byte channel unreferenced.
    Dropped,
}

/// Builds records for one probe invocation and submits them whole.
pub struct RecordAssembler<'a> {
    writer: ChunkWriter<'a>,
    records: &'a RingChannel,
    config: &'a StreamConfig,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(writer: ChunkWriter<'a>, records: &'a RingChannel, config: &'a StreamConfig) -> Self {
        Self {
            writer,
            records,
            config,
        }
    }

    /// Capture `task` and submit a task-exec record.
    pub fn emit_task_exec<S: TaskSource + ?Sized>(&self, source: &S, task: TaskHandle) -> EmitOutcome {
        let record = self.capture_task_exec(source, task);
        self.submit(&Signal::TaskExec(Box::new(record)))
    }

    pub fn emit_cgroup_snapshot(&self, cgroup_id: u64) -> EmitOutcome {
        self.submit(&Signal::CgroupSnapshot(CgroupSnapshot { cgroup_id }))
    }

    /// Fill a task-exec record. Every overflow field and byte block is
    /// written to the chunk channel before this returns.
    ///
    /// Scalar fields that cannot be read are left 0.
    pub fn capture_task_exec<S: TaskSource + ?Sized>(
        &self,
        source: &S,
        task: TaskHandle,
    ) -> TaskExecRecord {
        let field = |f: TaskField| source.read_field(task, f).unwrap_or(0);
        let field32 = |f: TaskField| field(f) as u32;

        let mut exec = ExecInfo {
            cgroup_id: field(TaskField::CgroupId),
            ..ExecInfo::default()
        };

        // Paths live in collector memory, argv/envp in the process's own.
        self.writer.encode_field(
            &mut exec.filename,
            source,
            field(TaskField::FilenamePtr),
            TrustDomain::Collector,
            self.config,
        );
        let interp = field(TaskField::InterpPtr);
        if interp != 0 {
            self.writer.encode_field(
                &mut exec.interp,
                source,
                interp,
                TrustDomain::Collector,
                self.config,
            );
        } else {
            exec.interp = StringField::Unavailable;
        }

        exec.args = self.copy_block(source, field(TaskField::ArgStart), field(TaskField::ArgEnd));
        exec.env = self.copy_block(source, field(TaskField::EnvStart), field(TaskField::EnvEnd));

        TaskExecRecord {
            creds: Credentials {
                uid: field32(TaskField::Uid),
                gid: field32(TaskField::Gid),
                euid: field32(TaskField::Euid),
                egid: field32(TaskField::Egid),
            },
            pid: ProcessIdentity {
                pid: field32(TaskField::Pid),
                tgid: field32(TaskField::Tgid),
                pid_vnr: field32(TaskField::PidVnr),
                pid_ns: field32(TaskField::PidNamespace),
            },
            parent: ParentIdentity {
                pid: field32(TaskField::ParentPid),
                tgid: field32(TaskField::ParentTgid),
                start_time: field(TaskField::ParentStartTime),
            },
            login_uid: field32(TaskField::LoginUid),
            session_id: field32(TaskField::SessionId),
            start_time: field(TaskField::StartTime),
            exec,
        }
    }

    fn copy_block<S: TaskSource + ?Sized>(&self, source: &S, start: u64, end: u64) -> BlockRef {
        let len = end.saturating_sub(start) as usize;
        if start == 0 || len == 0 {
            return BlockRef::default();
        }
        let CopyOutcome { head, status, .. } =
            self.writer
                .copy_bytes(source, start, len, TrustDomain::Monitored, self.config);
        BlockRef { head, status }
    }

    /// Frame `signal` and submit it in one reservation.
    pub fn submit(&self, signal: &Signal) -> EmitOutcome {
        let stats = self.writer.stats();
        let mut reservation = match self.records.reserve(signal.encoded_len()) {
            Ok(r) => r,
            Err(e) => {
                StreamStats::bump(&stats.records_dropped);
                log::debug!(
                    "shard {}: {:?} record dropped: {}",
                    self.writer.shard(),
                    signal.signal_type(),
                    e
                );
                return EmitOutcome::Dropped;
            }
        };

        signal.encode_into(
            self.writer.shard(),
            clock::boot_time_ns(),
            reservation.as_mut_slice(),
        );
        reservation.commit();
        StreamStats::bump(&stats.records_submitted);
        EmitOutcome::Submitted
    }
}
