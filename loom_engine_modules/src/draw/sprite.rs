/// Sprite drawing - one instanced draw over the shared texture array

use std::sync::{Arc, Mutex, Weak};
use bytemuck::{Pod, Zeroable};
use loom_engine::config::set_indexed;
use loom_engine::gpu::{BufferUsage, Chain, Device, Pipeline};
use loom_engine::loom::asset::{RequestKey, TextureRef};
use loom_engine::loom::{Result, Services};
use loom_engine::resource::{DeviceMirror, DirtyFlags};
use loom_engine::utils::lock;
use crate::draw::draw_module::{on_asset, DrawKind, DrawState};
use crate::signals::Placement;

/// Per-instance record read by the sprite shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SpriteMeta {
    /// Slot in the shared texture array
    pub texture: u32,
    /// Zero until the texture arrived, or after removal
    pub visible: u32,
}

pub struct SpriteData {
    /// Texture of each slot once resolved
    pub loaded: Vec<Option<TextureRef>>,
    /// Bound as `"sprites"`
    pub metas: DeviceMirror<SpriteMeta>,
    /// Texture array version currently bound as `"textures"`
    pub bound_version: Option<u64>,
}

impl Default for SpriteData {
    fn default() -> Self {
        Self {
            loaded: Vec::new(),
            metas: DeviceMirror::new("DrawSprite::sprites", BufferUsage::Storage),
            bound_version: None,
        }
    }
}

fn store_texture(data: &mut SpriteData, slot: usize, texture: TextureRef) {
    set_indexed(&mut data.loaded, slot, Some(texture));
}

pub struct SpriteKind;

impl DrawKind for SpriteKind {
    const TYPE_NAME: &'static str = "DrawSprite";
    const ITEM: &'static str = "sprite";
    type Data = SpriteData;

    fn request(services: &Services, state: Weak<Mutex<DrawState<SpriteData>>>, slot: usize, placement: &Placement) -> RequestKey {
        let callback = on_asset(state, placement.id.clone(), slot, store_texture);
        lock(&services.textures).request(placement.asset.clone(), callback)
    }

    fn cancel(services: &Services, key: RequestKey) {
        lock(&services.textures).cancel(key);
    }

    fn forget(data: &mut SpriteData, slot: usize) {
        if let Some(texture) = data.loaded.get_mut(slot) {
            *texture = None;
        }
    }

    fn sync(
        state: &mut DrawState<SpriteData>,
        services: &Services,
        device: &dyn Device,
        copy: &mut dyn Chain,
        pipeline: &Arc<dyn Pipeline>,
        rebind: bool,
    ) -> Result<()> {
        let array = lock(&services.texture_array);

        if state.dirty.take(DirtyFlags::METADATA) {
            let mut metas = vec![SpriteMeta::zeroed(); state.pool.high_water_mark()];
            for (slot, placement) in state.live() {
                let loaded = matches!(state.data.loaded.get(slot), Some(Some(_)));
                if let (true, Some(texture)) = (loaded, array.slot_of(&placement.asset)) {
                    metas[slot] = SpriteMeta { texture, visible: 1 };
                }
            }
            state.data.metas.replace(&metas);
        }

        let data = &mut state.data;
        data.metas.sync(device, copy)?;
        if data.metas.take_reallocated() || rebind {
            if let Some(buffer) = data.metas.buffer() {
                pipeline.bind_buffer("sprites", buffer)?;
            }
        }

        let stale = rebind || data.bound_version != Some(array.version());
        if stale && !array.is_empty() {
            pipeline.bind_images("textures", array.images())?;
            data.bound_version = Some(array.version());
        }
        Ok(())
    }

    fn record(state: &DrawState<SpriteData>, chain: &mut dyn Chain, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        let instances = state.pool.high_water_mark() as u32;
        chain.bind(pipeline)?;
        if instances > 0 {
            chain.draw_instanced(6, instances)?;
        }
        Ok(())
    }
}
