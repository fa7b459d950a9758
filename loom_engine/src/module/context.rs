/// What a module receives at subscription

use crate::asset::{AssetBroker, ModelRef, SharedBroker, SharedTextureArray, TextureArray, TextureRef};
use crate::bus::{signal_name, Bus};
use crate::gpu::DeviceRegistry;

/// Shared services injected into every module of one engine
#[derive(Clone)]
pub struct Services {
    pub devices: DeviceRegistry,
    pub models: SharedBroker<ModelRef>,
    pub textures: SharedBroker<TextureRef>,
    pub texture_array: SharedTextureArray,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            devices: DeviceRegistry::new(),
            models: AssetBroker::shared("models"),
            textures: AssetBroker::shared("textures"),
            texture_array: TextureArray::shared(),
        }
    }
}

/// Subscription context: identity, bus and services
pub struct ModuleContext {
    name: String,
    bus: Bus,
    services: Services,
}

impl ModuleContext {
    pub fn new(name: impl Into<String>, bus: Bus, services: Services) -> Self {
        Self { name: name.into(), bus, services }
    }

    /// Instance name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This module's bus handle
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// `"<name>::<port>"`
    pub fn port(&self, port: &str) -> String {
        signal_name(&self.name, port)
    }
}
