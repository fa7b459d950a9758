/// RenderPass trait - presentable target with subpasses

use std::sync::{Arc, Mutex};
use serde::{Deserialize, Serialize};
use winit::dpi::PhysicalSize;
use crate::bus::Link;
use crate::error::Result;
use crate::gpu::{Chain, Image, ImageFormat};

/// One color or depth attachment of a subpass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDesc {
    #[serde(default)]
    pub format: ImageFormat,
    #[serde(default)]
    pub clear_color: [f32; 4],
}

/// Subpass layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubpassDesc {
    #[serde(default)]
    pub depth_enable: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentDesc>,
    /// Earlier subpasses whose output this one reads
    #[serde(default)]
    pub depends: Vec<u32>,
}

impl Default for SubpassDesc {
    fn default() -> Self {
        Self {
            depth_enable: false,
            attachments: vec![AttachmentDesc { format: ImageFormat::Rgba8, clear_color: [0.0, 0.0, 0.0, 1.0] }],
            depends: Vec::new(),
        }
    }
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDesc {
    pub name: String,
    pub extent: PhysicalSize<u32>,
    pub subpasses: Vec<SubpassDesc>,
}

/// Outcome of presenting a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The surface was lost or resized; every dependent object must be rebuilt
    SurfaceLost,
}

/// Render pass
pub trait RenderPass: Send {
    fn name(&self) -> &str;

    fn extent(&self) -> PhysicalSize<u32>;

    fn subpass_count(&self) -> u32;

    /// Present the submitted chain
    fn present(&mut self, chain: &mut dyn Chain) -> Result<PresentStatus>;

    /// Color output of the last presented frame
    fn output(&self) -> Option<Arc<dyn Image>>;
}

pub type SharedRenderPass = Arc<Mutex<dyn RenderPass>>;
pub type PassLink = Link<Mutex<dyn RenderPass>>;
