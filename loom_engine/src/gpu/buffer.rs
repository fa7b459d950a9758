/// Buffer and image contracts

use std::any::Any;
use serde::{Deserialize, Serialize};
use winit::dpi::PhysicalSize;
use crate::bus::Link;
use crate::error::Result;

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Structured data read by shaders (transforms, metadata)
    Storage,
    /// Small per-frame constants (view/projection)
    Uniform,
    /// Vertex data
    Vertex,
    /// Index data
    Index,
    /// Host-visible upload source
    Staging,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub name: String,
    /// Size in bytes
    pub size: u64,
    pub usage: BufferUsage,
}

/// Device buffer
pub trait Buffer: Send + Sync {
    fn name(&self) -> &str;

    /// Size in bytes
    fn size(&self) -> u64;

    fn usage(&self) -> BufferUsage;

    /// Write bytes at `offset` (backends without host-visible memory go through a chain copy)
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    #[default]
    Rgba8,
    Bgra8,
    R8,
    Rg8,
    Depth32,
    /// Four 32-bit float channels, written by compute stages
    Rgba32f,
}

impl ImageFormat {
    /// Bytes per pixel
    pub fn texel_size(self) -> u32 {
        match self {
            ImageFormat::Rgba8 | ImageFormat::Bgra8 | ImageFormat::Depth32 => 4,
            ImageFormat::R8 => 1,
            ImageFormat::Rg8 => 2,
            ImageFormat::Rgba32f => 16,
        }
    }

    /// Format for a host image with `channels` interleaved 8-bit channels
    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(ImageFormat::R8),
            2 => Some(ImageFormat::Rg8),
            3 | 4 => Some(ImageFormat::Rgba8),
            _ => None,
        }
    }
}

/// Image descriptor
#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub name: String,
    pub extent: PhysicalSize<u32>,
    pub format: ImageFormat,
}

/// Device image
pub trait Image: Send + Sync {
    fn name(&self) -> &str;
    fn extent(&self) -> PhysicalSize<u32>;
    fn format(&self) -> ImageFormat;

    /// Bytes one full upload of this image covers
    fn byte_size(&self) -> u64 {
        self.extent().width as u64 * self.extent().height as u64 * self.format().texel_size() as u64
    }

    fn as_any(&self) -> &dyn Any;
}

pub type ImageLink = Link<dyn Image>;

impl std::fmt::Debug for dyn Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("name", &self.name())
            .field("extent", &self.extent())
            .finish()
    }
}
