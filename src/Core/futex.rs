// Consumer wake-up word. Producers bump the word on every commit and wake
// one sleeper if any are registered; the consumer sleeps while the word
// still holds the value it observed before finding the channel empty.
//
// `waiters` counts sleepers. Both sides use SeqCst so that either the
// producer sees the sleeper or the sleeper's FUTEX_WAIT sees the bump.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Bump `word` and wake one waiter. No syscall when nobody sleeps.
pub fn notify(word: &AtomicU32, waiters: &AtomicU32) {
    word.fetch_add(1, Ordering::SeqCst);
    if waiters.load(Ordering::SeqCst) != 0 {
        wake_one(word);
    }
}

/// Sleep on `word` as a registered waiter. See [`wait`].
pub fn wait_registered(
    word: &AtomicU32,
    waiters: &AtomicU32,
    observed: u32,
    timeout: Option<Duration>,
) {
    waiters.fetch_add(1, Ordering::SeqCst);
    wait(word, observed, timeout);
    waiters.fetch_sub(1, Ordering::SeqCst);
}

/// Sleep until `word` no longer equals `observed`, a wake-up arrives, or
/// `timeout` elapses. Spurious returns are allowed; callers re-check.
#[cfg(target_os = "linux")]
pub fn wait(word: &AtomicU32, observed: u32, timeout: Option<Duration>) {
    if word.load(Ordering::Acquire) != observed {
        return;
    }

    let ts = timeout.map(|t| libc::timespec {
        tv_sec: t.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: t.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            observed,
            ts_ptr,
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(target_os = "linux")]
fn wake_one(word: &AtomicU32) {
    // Not FUTEX_PRIVATE_FLAG: the word may live in /dev/shm and the
    // sleeper may be another process.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            1,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn wait(word: &AtomicU32, observed: u32, timeout: Option<Duration>) {
    if word.load(Ordering::Acquire) != observed {
        return;
    }
    match timeout {
        Some(t) => std::thread::sleep(t.min(Duration::from_millis(1))),
        None => std::thread::yield_now(),
    }
}

#[cfg(not(target_os = "linux"))]
fn wake_one(_word: &AtomicU32) {}
