/// Textured quads - one draw per placement

use std::sync::{Arc, Mutex, Weak};
use loom_engine::config::set_indexed;
use loom_engine::gpu::{Chain, Pipeline};
use loom_engine::loom::asset::{RequestKey, TextureRef};
use loom_engine::loom::{Result, Services};
use loom_engine::utils::lock;
use crate::draw::draw_module::{on_asset, DrawKind, DrawState};
use crate::signals::Placement;

#[derive(Default)]
pub struct Tex2dData {
    pub textures: Vec<Option<TextureRef>>,
}

fn store_texture(data: &mut Tex2dData, slot: usize, texture: TextureRef) {
    set_indexed(&mut data.textures, slot, Some(texture));
}

pub struct Tex2dKind;

impl DrawKind for Tex2dKind {
    const TYPE_NAME: &'static str = "DrawTex2d";
    const ITEM: &'static str = "texture";
    type Data = Tex2dData;

    fn request(services: &Services, state: Weak<Mutex<DrawState<Tex2dData>>>, slot: usize, placement: &Placement) -> RequestKey {
        let callback = on_asset(state, placement.id.clone(), slot, store_texture);
        lock(&services.textures).request(placement.asset.clone(), callback)
    }

    fn cancel(services: &Services, key: RequestKey) {
        lock(&services.textures).cancel(key);
    }

    fn forget(data: &mut Tex2dData, slot: usize) {
        if let Some(texture) = data.textures.get_mut(slot) {
            *texture = None;
        }
    }

    fn record(state: &DrawState<Tex2dData>, chain: &mut dyn Chain, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        chain.bind(pipeline)?;
        for (slot, _) in state.live() {
            let Some(Some(texture)) = state.data.textures.get(slot) else {
                continue;
            };
            pipeline.bind_images("texture", std::slice::from_ref(texture))?;
            chain.push(bytemuck::bytes_of(&(slot as u32)))?;
            chain.draw(6)?;
        }
        Ok(())
    }
}
