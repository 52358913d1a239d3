// Bounded byte channels. The same ring carries chunks and whole records.

pub mod Ring {
    pub mod layout;
    #[allow(clippy::module_inception)]
    pub mod Ring;
    pub mod Ring_impl;
    pub use Ring::{Reservation, RingChannel};
}
pub mod builder;
pub mod consumer;

pub use builder::ChannelBuilder;
pub use Ring::{Reservation, RingChannel};
