/// Device trait and the registry modules look devices up in

use std::sync::{Arc, RwLock};
use rustc_hash::FxHashMap;
use crate::error::Result;
use crate::gpu::{
    Buffer, BufferDesc, Image, ImageDesc, Pipeline, PipelineDesc,
    RenderPassDesc, SharedChain, SharedRenderPass,
};

/// Chain descriptor
#[derive(Clone)]
pub struct ChainDesc {
    pub name: String,
    /// Parent pass and subpass a graphics chain records into
    pub pass: Option<(SharedRenderPass, u32)>,
}

impl ChainDesc {
    pub fn transfer(name: impl Into<String>) -> Self {
        Self { name: name.into(), pass: None }
    }

    /// Compute work is recorded outside any render pass
    pub fn compute(name: impl Into<String>) -> Self {
        Self { name: name.into(), pass: None }
    }

    pub fn graphics(name: impl Into<String>, pass: SharedRenderPass, subpass: u32) -> Self {
        Self { name: name.into(), pass: Some((pass, subpass)) }
    }
}

/// Factory for every GPU object
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    fn create_chain(&self, desc: ChainDesc) -> Result<SharedChain>;

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    fn create_image(&self, desc: ImageDesc) -> Result<Arc<dyn Image>>;

    fn create_pipeline(&self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>>;

    fn create_render_pass(&self, desc: RenderPassDesc) -> Result<SharedRenderPass>;

    /// Wait for all GPU operations to complete
    fn wait_idle(&self) -> Result<()>;
}

/// Device identifier as carried in configuration and signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

/// Devices by id, shared by every module of an engine
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<FxHashMap<DeviceId, Arc<dyn Device>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, replacing any previous device with this id
    pub fn insert(&self, id: DeviceId, device: Arc<dyn Device>) {
        if let Ok(mut devices) = self.devices.write() {
            devices.insert(id, device);
        }
    }

    pub fn remove(&self, id: DeviceId) -> Option<Arc<dyn Device>> {
        self.devices.write().ok()?.remove(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<Arc<dyn Device>> {
        self.devices.read().ok()?.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
