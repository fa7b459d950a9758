/// Pipeline trait - binds named resources for a shader program

use std::sync::Arc;
use crate::error::Result;
use crate::gpu::{Buffer, Image, SharedRenderPass};

/// Pipeline kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// Pipeline descriptor
///
/// Shader byte-code is opaque to the engine.
#[derive(Clone)]
pub struct PipelineDesc {
    pub name: String,
    pub kind: PipelineKind,
    pub shader: Vec<u8>,
    /// Render pass and subpass a graphics pipeline draws into
    pub pass: Option<(SharedRenderPass, u32)>,
}

/// Compiled pipeline
pub trait Pipeline: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> PipelineKind;

    /// Bind a buffer under a resource key declared by the shader
    fn bind_buffer(&self, key: &str, buffer: &Arc<dyn Buffer>) -> Result<()>;

    /// Bind an image array under a resource key (a single image is an array of one)
    fn bind_images(&self, key: &str, images: &[Arc<dyn Image>]) -> Result<()>;

    /// Whether something is bound under `key`
    fn is_bound(&self, key: &str) -> bool;
}
