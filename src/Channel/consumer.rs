// Single-consumer side of RingChannel.

use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::time::{Duration, Instant};

use super::Ring::layout::{record_span, BUSY_BIT, DISCARD_BIT, LEN_MASK, RECORD_HEADER_LEN};
use super::Ring::RingChannel;
use crate::Core::futex;

impl RingChannel {
    /// Hand the next committed record to `f` and release its space.
    ///
    /// Discarded records are skipped. Returns `None` when the channel is
    /// empty or the oldest pending record is still being written.
    pub fn receive_with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let _guard = self.consumer_lock.lock();
        let h = self.header();
        let mut cons = h.consumer_pos.load(Relaxed);

        loop {
            let prod = h.producer_pos.load(Acquire);
            if cons >= prod {
                return None;
            }

            let offset = (cons as usize) & self.mask;
            let word = unsafe { self.record_word(offset) }.load(Acquire);
            if word & BUSY_BIT != 0 {
                return None;
            }

            let len = (word & LEN_MASK) as usize;
            let next = cons + record_span(len) as u64;

            if word & DISCARD_BIT != 0 {
                cons = next;
                h.consumer_pos.store(cons, Release);
                continue;
            }

            let data = unsafe {
                std::slice::from_raw_parts(self.data.add(offset + RECORD_HEADER_LEN), len)
            };
            let out = f(data);
            h.consumer_pos.store(next, Release);
            return Some(out);
        }
    }

    /// Receives the next committed record if one is available.
    pub fn receive(&self) -> Option<Vec<u8>> {
        self.receive_with(|data| data.to_vec())
    }

    /// Receives a record, sleeping until one is committed.
    pub fn receive_blocking(&self) -> Vec<u8> {
        let h = self.header();
        loop {
            let observed = h.signal.load(Acquire);
            if let Some(data) = self.receive() {
                return data;
            }
            futex::wait_registered(&h.signal, &h.waiters, observed, None);
        }
    }

    /// Receives a record, waiting up to `timeout`.
    pub fn receive_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        let start = Instant::now();
        let h = self.header();
        loop {
            let observed = h.signal.load(Acquire);
            if let Some(data) = self.receive() {
                return Some(data);
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return None;
            }
            // Capped so a channel built without FLAG_NOTIFY is still polled
            futex::wait_registered(
                &h.signal,
                &h.waiters,
                observed,
                Some(remaining.min(Duration::from_millis(10))),
            );
        }
    }

    /// Feed every record currently available to `f`. Returns how many.
    pub fn drain_with(&self, mut f: impl FnMut(&[u8])) -> usize {
        let mut count = 0;
        while self.receive_with(&mut f).is_some() {
            count += 1;
        }
        count
    }

    /// True when records are pending but the oldest is still BUSY.
    pub fn is_blocked(&self) -> bool {
        let h = self.header();
        let cons = h.consumer_pos.load(Acquire);
        if cons >= h.producer_pos.load(Acquire) {
            return false;
        }
        let word = unsafe { self.record_word((cons as usize) & self.mask) }.load(Acquire);
        word & BUSY_BIT != 0
    }

    /// Consumers currently asleep waiting for a commit.
    pub fn waiters(&self) -> u32 {
        self.header().waiters.load(Acquire)
    }
}
