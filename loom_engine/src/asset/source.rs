/// Asset sources and the manifest they resolve from

use std::sync::Arc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use winit::dpi::PhysicalSize;
use crate::asset::{ModelAsset, ModelRef, TextureRef};
use crate::error::Result;
use crate::gpu::{BufferDesc, BufferUsage, Device, ImageDesc, ImageFormat};

/// Resolves an asset id to a reference
pub trait AssetSource<R> {
    /// `Ok(None)` means "not available yet"; the request stays pending
    fn load(&mut self, id: &str) -> Result<Option<R>>;
}

/// Manifest entry for a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub vertex_count: u32,
    #[serde(default)]
    pub index_count: u32,
}

/// Manifest entry for a texture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default = "unit_extent")]
    pub width: u32,
    #[serde(default = "unit_extent")]
    pub height: u32,
    #[serde(default)]
    pub format: ImageFormat,
}

fn unit_extent() -> u32 {
    1
}

/// Assets known to the database, by id
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    models: FxHashMap<String, ModelEntry>,
    textures: FxHashMap<String, TextureEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&mut self, entry: ModelEntry) {
        self.models.insert(entry.id.clone(), entry);
    }

    pub fn add_texture(&mut self, entry: TextureEntry) {
        self.textures.insert(entry.id.clone(), entry);
    }

    pub fn model(&self, id: &str) -> Option<&ModelEntry> {
        self.models.get(id)
    }

    pub fn texture(&self, id: &str) -> Option<&TextureEntry> {
        self.textures.get(id)
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

/// Creates device objects for manifest entries
pub struct DeviceAssetSource<'a> {
    device: &'a dyn Device,
    manifest: &'a Manifest,
}

impl<'a> DeviceAssetSource<'a> {
    pub fn new(device: &'a dyn Device, manifest: &'a Manifest) -> Self {
        Self { device, manifest }
    }
}

impl AssetSource<ModelRef> for DeviceAssetSource<'_> {
    fn load(&mut self, id: &str) -> Result<Option<ModelRef>> {
        let Some(entry) = self.manifest.model(id) else {
            return Ok(None);
        };
        let vertices = self.device.create_buffer(BufferDesc {
            name: format!("{}::vertices", entry.id),
            size: (entry.vertex_count.max(1) as u64) * 32,
            usage: BufferUsage::Vertex,
        })?;
        let indices = self.device.create_buffer(BufferDesc {
            name: format!("{}::indices", entry.id),
            size: (entry.index_count.max(1) as u64) * 4,
            usage: BufferUsage::Index,
        })?;
        Ok(Some(Arc::new(ModelAsset {
            id: entry.id.clone(),
            index_count: entry.index_count,
            vertices,
            indices,
        })))
    }
}

impl AssetSource<TextureRef> for DeviceAssetSource<'_> {
    fn load(&mut self, id: &str) -> Result<Option<TextureRef>> {
        let Some(entry) = self.manifest.texture(id) else {
            return Ok(None);
        };
        let image = self.device.create_image(ImageDesc {
            name: entry.id.clone(),
            extent: PhysicalSize::new(entry.width, entry.height),
            format: entry.format,
        })?;
        Ok(Some(image))
    }
}
