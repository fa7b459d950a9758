/// Asset database - resolves the shared brokers once per frame

use std::any::Any;
use std::path::Path;
use std::sync::{Arc, Mutex};
use serde::Deserialize;
use serde_json::Value;
use loom_engine::asset::{
    AssetSource, DeviceAssetSource, Manifest, ModelEntry, SharedTextureArray, TextureEntry, TextureRef,
};
use loom_engine::bus::Requirement;
use loom_engine::gpu::{Device, DeviceId};
use loom_engine::loom::{Error, Module, ModuleContext, Result, Services};
use loom_engine::resource::{GateStatus, ResourceGate};
use loom_engine::utils::lock;
use loom_engine::{engine_info, engine_warn};
use crate::ports;

/// Manifest file layout
#[derive(Debug, Default, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    models: Vec<ModelEntry>,
    #[serde(default)]
    textures: Vec<TextureEntry>,
}

impl ManifestFile {
    fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|err| Error::ConfigError(format!("{}: {}", path.display(), err)))
    }
}

#[derive(Default)]
struct DatabaseState {
    device: Option<DeviceId>,
    manifest: Manifest,
}

/// Loads textures through the device and files them in the shared array
struct ArraySource<'a> {
    inner: DeviceAssetSource<'a>,
    array: &'a SharedTextureArray,
}

impl AssetSource<TextureRef> for ArraySource<'_> {
    fn load(&mut self, id: &str) -> Result<Option<TextureRef>> {
        let image = AssetSource::<TextureRef>::load(&mut self.inner, id)?;
        if let Some(image) = &image {
            lock(self.array).insert(id, image.clone());
        }
        Ok(image)
    }
}

/// Owns the manifest and fulfills pending model and texture requests
///
/// Ports: `::device`, `::models` and `::textures` (manifest entries) and
/// `::manifest` (path to a JSON file holding both lists).
pub struct AssetDatabase {
    name: String,
    state: Arc<Mutex<DatabaseState>>,
    services: Option<Services>,
    gate: ResourceGate,
    device: Option<Arc<dyn Device>>,
    delivered: usize,
}

impl AssetDatabase {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(DatabaseState::default())),
            services: None,
            gate: ResourceGate::new("AssetDatabase"),
            device: None,
            delivered: 0,
        }
    }

    /// Callbacks dispatched so far
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    pub fn add_model(&self, entry: ModelEntry) {
        lock(&self.state).manifest.add_model(entry);
    }

    pub fn add_texture(&self, entry: TextureEntry) {
        lock(&self.state).manifest.add_texture(entry);
    }
}

impl Default for AssetDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for AssetDatabase {
    fn type_name(&self) -> &'static str {
        "AssetDatabase"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        self.gate = ResourceGate::new(format!("AssetDatabase[{}]", self.name));
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut DatabaseState| &mut s.device);
        let source = ctx.port("models");
        bus.enroll_to(&self.state, ctx.port("models"), Requirement::Optional, move |s: &mut DatabaseState, v: &Value| {
            match serde_json::from_value::<Vec<ModelEntry>>(v.clone()) {
                Ok(entries) => entries.into_iter().for_each(|entry| s.manifest.add_model(entry)),
                Err(err) => engine_warn!("loom::AssetDatabase", "'{}' is not a model list: {}", source, err),
            }
        });
        let source = ctx.port("textures");
        bus.enroll_to(&self.state, ctx.port("textures"), Requirement::Optional, move |s: &mut DatabaseState, v: &Value| {
            match serde_json::from_value::<Vec<TextureEntry>>(v.clone()) {
                Ok(entries) => entries.into_iter().for_each(|entry| s.manifest.add_texture(entry)),
                Err(err) => engine_warn!("loom::AssetDatabase", "'{}' is not a texture list: {}", source, err),
            }
        });
        bus.enroll_to(&self.state, ctx.port("manifest"), Requirement::Optional, |s: &mut DatabaseState, v: &Value| {
            let Some(path) = v.as_str() else {
                return;
            };
            match ManifestFile::read(Path::new(path)) {
                Ok(file) => {
                    file.models.into_iter().for_each(|entry| s.manifest.add_model(entry));
                    file.textures.into_iter().for_each(|entry| s.manifest.add_texture(entry));
                }
                Err(err) => engine_warn!("loom::AssetDatabase", "Cannot load manifest: {}", err),
            }
        });

        self.services = Some(ctx.services().clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let Some(services) = self.services.clone() else {
            return Ok(());
        };

        let device = lock(&self.state).device.and_then(|id| services.devices.get(id));
        let slot = &mut self.device;
        let status = self.gate.poll(&[("device", device.is_some())], |_| {
            *slot = device;
            Ok(())
        })?;
        if let GateStatus::Constructed { .. } = status {
            let state = lock(&self.state);
            engine_info!(
                "loom::AssetDatabase",
                "[{}] serving {} model(s), {} texture(s)",
                self.name, state.manifest.model_count(), state.manifest.texture_count()
            );
        }
        let Some(device) = self.device.clone() else {
            return Ok(());
        };

        // Both locks are released before any callback runs.
        let (models, textures) = {
            let state = lock(&self.state);
            let models = lock(&services.models).resolve(&mut DeviceAssetSource::new(device.as_ref(), &state.manifest));
            let mut source = ArraySource {
                inner: DeviceAssetSource::new(device.as_ref(), &state.manifest),
                array: &services.texture_array,
            };
            let textures = lock(&services.textures).resolve(&mut source);
            (models, textures)
        };
        self.delivered += models.dispatch() + textures.dispatch();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
