pub mod slot_pool;
mod sync;

pub use slot_pool::SlotPool;
pub use sync::lock;
