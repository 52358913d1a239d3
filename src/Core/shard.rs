// Shard = execution context with its own chunk-id counter (one per CPU).

use lazy_static::lazy_static;

/// Shard tag stored in the top 16 bits of every chunk id.
pub type ShardId = u16;

lazy_static! {
    /// Number of configured CPUs, read once.
    pub static ref CONFIGURED_CPUS: usize = configured_cpus();
}

fn configured_cpus() -> usize {
    #[cfg(unix)]
    {
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
        if n > 0 {
            return n as usize;
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Shard of the calling thread: the CPU it is running on right now.
///
/// Threads may migrate between calls. Callers that need a stable tag for
/// the whole invocation read it once and carry it.
pub fn current_shard() -> ShardId {
    #[cfg(target_os = "linux")]
    {
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu >= 0 {
            return (cpu as usize & 0xFFFF) as ShardId;
        }
    }
    0
}
