use super::Ring::layout::{header_span, FLAG_NOTIFY, MIN_CAPACITY};
use super::Ring::RingChannel;
use crate::Core::{attach_shared_memory, create_shared_memory, heap_region};
use std::io;

pub struct ChannelBuilder {
    capacity: usize,
    shared_name: Option<String>,
    notify: bool,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self {
            capacity: 1024 * 1024, // 1MB default
            shared_name: None,     // Private heap region
            notify: true,
        }
    }
}

impl ChannelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data band size in bytes. Rounded up to a power of two, at least
    /// 8 KiB.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        self
    }

    /// Back the channel with `/dev/shm/<name>` so another process can
    /// [`RingChannel::attach`] to it.
    pub fn with_shared_name(mut self, name: impl Into<String>) -> Self {
        self.shared_name = Some(name.into());
        self
    }

    /// Wake a sleeping consumer on every commit. On by default.
    pub fn with_notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn build(self) -> io::Result<RingChannel> {
        let size = header_span() + self.capacity;
        let region = match &self.shared_name {
            Some(name) => create_shared_memory(size, name)?,
            None => heap_region(size)?,
        };
        let flags = if self.notify { FLAG_NOTIFY } else { 0 };

        log::debug!(
            "channel built: capacity={} shared={:?}",
            self.capacity,
            self.shared_name
        );
        RingChannel::initialize(region, self.capacity, flags, self.shared_name)
    }
}

impl RingChannel {
    /// Open a channel another process created with
    /// [`ChannelBuilder::with_shared_name`].
    pub fn attach(name: &str) -> io::Result<Self> {
        let region = attach_shared_memory(name, header_span())?;
        RingChannel::from_existing(region, Some(name.to_string()))
    }
}
