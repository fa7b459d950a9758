//! Lazy construction and host/device synchronization of module resources

mod gate;
mod dirty;
mod mirror;

pub use gate::{ResourceGate, GateState, GateStatus};
pub use dirty::DirtyFlags;
pub use mirror::{DeviceMirror, GROWTH_HEADROOM};
