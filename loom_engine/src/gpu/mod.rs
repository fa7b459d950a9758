//! Narrow contracts over the graphics backend
//!
//! Modules only talk to the GPU through these traits. `headless` provides a
//! recording implementation that needs no hardware.

mod device;
mod chain;
mod buffer;
mod pipeline;
mod render_pass;
mod cycle;
pub mod headless;

pub use device::{Device, DeviceId, DeviceRegistry, ChainDesc};
pub use chain::{Chain, ChainState, SharedChain, ChainLink};
pub use buffer::{Buffer, BufferDesc, BufferUsage, Image, ImageDesc, ImageFormat, ImageLink};
pub use pipeline::{Pipeline, PipelineDesc, PipelineKind};
pub use render_pass::{
    RenderPass, RenderPassDesc, SubpassDesc, AttachmentDesc, PresentStatus,
    SharedRenderPass, PassLink,
};
pub use cycle::{ChainCycle, CycleOutcome};
