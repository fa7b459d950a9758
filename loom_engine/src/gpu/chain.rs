/// Chain trait - recorded GPU work with a ring of in-flight slots

use std::any::Any;
use std::sync::{Arc, Mutex};
use crate::bus::Link;
use crate::error::Result;
use crate::gpu::{Buffer, Image, Pipeline};

/// Chain state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// Created, nothing recorded yet
    Uninitialized,
    /// Holds recorded work that has not been submitted
    Idle,
    /// Between `begin()` and `end()`
    Recording,
    /// Work handed to the device
    Submitted,
}

/// Recorded GPU work
///
/// Every frame a chain either submits new work or calls [`Chain::advance`] so
/// its ring index stays in lockstep with the chains it is combined into.
pub trait Chain: Send {
    fn name(&self) -> &str;

    fn state(&self) -> ChainState;

    /// Current slot in the ring of in-flight buffers
    fn ring_index(&self) -> usize;

    fn ring_size(&self) -> usize;

    /// Start recording into the current ring slot
    fn begin(&mut self) -> Result<()>;

    /// Finish recording
    fn end(&mut self) -> Result<()>;

    /// Bind a pipeline for the following draws
    fn bind(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()>;

    /// Attach constant bytes to the next draw or dispatch
    fn push(&mut self, constants: &[u8]) -> Result<()>;

    fn draw(&mut self, vertex_count: u32) -> Result<()>;

    fn draw_indexed(&mut self, vertices: &Arc<dyn Buffer>, indices: &Arc<dyn Buffer>, index_count: u32) -> Result<()>;

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32) -> Result<()>;

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()>;

    /// Record a host-to-device copy into `dst` at `offset`
    fn copy(&mut self, data: &[u8], dst: &Arc<dyn Buffer>, offset: u64) -> Result<()>;

    /// Record a copy of `src` into the texels of `dst`
    ///
    /// The first `width * height * texel_size` bytes of the buffer are used.
    fn copy_to_image(&mut self, src: &Arc<dyn Buffer>, dst: &Arc<dyn Image>) -> Result<()>;

    /// Submit recorded work and advance the ring
    fn submit(&mut self) -> Result<()>;

    /// Block until submitted work completes
    fn synchronize(&mut self) -> Result<()>;

    /// Advance the ring without new work
    fn advance(&mut self) -> Result<()>;

    /// Append a child's recorded work; call order is draw order
    fn combine(&mut self, child: &dyn Chain) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

pub type SharedChain = Arc<Mutex<dyn Chain>>;
pub type ChainLink = Link<Mutex<dyn Chain>>;
