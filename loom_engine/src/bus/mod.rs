//! Named-signal bus
//!
//! Modules never reference each other directly: they enroll callbacks on
//! signal names and publish values under names, all scoped to a channel.

mod router;
mod bus;
mod link;

pub use router::{SignalRouter, ChannelId, EnrollmentId, Requirement};
pub use bus::{Bus, WeakBus, WaitStatus, STALL_WARNING_FRAMES, signal_name};
pub use link::Link;
