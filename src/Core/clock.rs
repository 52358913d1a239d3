use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since boot, including suspend (`CLOCK_BOOTTIME`).
///
/// Falls back to wall-clock nanoseconds where the boot clock is unavailable.
pub fn boot_time_ns() -> u64 {
    #[cfg(target_os = "linux")]
    {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        if unsafe { libc::clock_gettime(libc::CLOCK_BOOTTIME, &mut ts) } == 0 {
            return ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64;
        }
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
