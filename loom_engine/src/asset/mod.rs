//! Streamed assets: request broker, sources, shared texture array

mod broker;
mod source;
mod texture_array;

pub use broker::{AssetBroker, AssetCallback, Fulfilled, RequestKey, SharedBroker};
pub use source::{AssetSource, DeviceAssetSource, Manifest, ModelEntry, TextureEntry};
pub use texture_array::{TextureArray, SharedTextureArray};

use std::sync::Arc;
use crate::gpu::{Buffer, Image};

/// Geometry resolved for a model id
pub struct ModelAsset {
    pub id: String,
    pub index_count: u32,
    pub vertices: Arc<dyn Buffer>,
    pub indices: Arc<dyn Buffer>,
}

pub type ModelRef = Arc<ModelAsset>;
pub type TextureRef = Arc<dyn Image>;
