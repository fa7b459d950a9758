/// Model drawing - indexed meshes from the model broker

use std::sync::{Arc, Mutex, Weak};
use glam::Mat4;
use loom_engine::bus::Requirement;
use loom_engine::config::set_indexed;
use loom_engine::gpu::{BufferUsage, Chain, Device, Pipeline};
use loom_engine::loom::asset::{ModelRef, RequestKey};
use loom_engine::loom::{ModuleContext, Result, Services};
use loom_engine::resource::DeviceMirror;
use loom_engine::utils::lock;
use crate::draw::draw_module::{on_asset, DrawKind, DrawState};
use crate::ports;
use crate::signals::Placement;

const VIEW: usize = 0;
const PROJECTION: usize = 1;

pub struct ModelData {
    /// Resolved mesh of each slot
    pub meshes: Vec<Option<ModelRef>>,
    /// View and projection, bound as `"camera"`
    pub camera: DeviceMirror<Mat4>,
}

impl Default for ModelData {
    fn default() -> Self {
        let mut camera = DeviceMirror::new("DrawModel::camera", BufferUsage::Uniform).with_headroom(2);
        camera.replace(&[Mat4::IDENTITY, Mat4::IDENTITY]);
        Self { meshes: Vec::new(), camera }
    }
}

fn store_mesh(data: &mut ModelData, slot: usize, mesh: ModelRef) {
    set_indexed(&mut data.meshes, slot, Some(mesh));
}

/// Ports: `::camera` and `::projection`, names carrying `Mat4`
pub struct ModelKind;

impl DrawKind for ModelKind {
    const TYPE_NAME: &'static str = "DrawModel";
    const ITEM: &'static str = "model";
    type Data = ModelData;

    fn subscribe(ctx: &ModuleContext, state: &Arc<Mutex<DrawState<ModelData>>>) {
        let bus = ctx.bus();
        ports::follow(bus, state, ctx.port("camera"), Requirement::Optional, |s: &mut DrawState<ModelData>, m: &Mat4| {
            s.data.camera.set(VIEW, *m);
        });
        ports::follow(bus, state, ctx.port("projection"), Requirement::Optional, |s: &mut DrawState<ModelData>, m: &Mat4| {
            s.data.camera.set(PROJECTION, *m);
        });
    }

    fn request(services: &Services, state: Weak<Mutex<DrawState<ModelData>>>, slot: usize, placement: &Placement) -> RequestKey {
        let callback = on_asset(state, placement.id.clone(), slot, store_mesh);
        lock(&services.models).request(placement.asset.clone(), callback)
    }

    fn cancel(services: &Services, key: RequestKey) {
        lock(&services.models).cancel(key);
    }

    fn forget(data: &mut ModelData, slot: usize) {
        if let Some(mesh) = data.meshes.get_mut(slot) {
            *mesh = None;
        }
    }

    fn sync(
        state: &mut DrawState<ModelData>,
        _services: &Services,
        device: &dyn Device,
        copy: &mut dyn Chain,
        pipeline: &Arc<dyn Pipeline>,
        rebind: bool,
    ) -> Result<()> {
        let camera = &mut state.data.camera;
        camera.sync(device, copy)?;
        if camera.take_reallocated() || rebind {
            if let Some(buffer) = camera.buffer() {
                pipeline.bind_buffer("camera", buffer)?;
            }
        }
        Ok(())
    }

    fn record(state: &DrawState<ModelData>, chain: &mut dyn Chain, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        chain.bind(pipeline)?;
        for (slot, _) in state.live() {
            let Some(Some(mesh)) = state.data.meshes.get(slot) else {
                continue;
            };
            chain.push(bytemuck::bytes_of(&(slot as u32)))?;
            chain.draw_indexed(&mesh.vertices, &mesh.indices, mesh.index_count)?;
        }
        Ok(())
    }
}
