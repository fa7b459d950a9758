/// Texture array shared by every sprite-style module of an engine

use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::asset::TextureRef;

pub type SharedTextureArray = Arc<Mutex<TextureArray>>;

/// Ordered set of textures addressed by slot
///
/// Holding the mutex is the mutation/bind window: a reader binds the whole
/// array under the lock and compares [`TextureArray::version`] to decide
/// whether its binding is stale.
#[derive(Default)]
pub struct TextureArray {
    images: Vec<TextureRef>,
    slots: FxHashMap<String, u32>,
    version: u64,
}

impl TextureArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedTextureArray {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Insert or replace the texture for `id`, returning its slot
    pub fn insert(&mut self, id: &str, image: TextureRef) -> u32 {
        self.version += 1;
        if let Some(&slot) = self.slots.get(id) {
            self.images[slot as usize] = image;
            return slot;
        }
        let slot = self.images.len() as u32;
        self.images.push(image);
        self.slots.insert(id.to_string(), slot);
        slot
    }

    pub fn slot_of(&self, id: &str) -> Option<u32> {
        self.slots.get(id).copied()
    }

    pub fn get(&self, slot: u32) -> Option<&TextureRef> {
        self.images.get(slot as usize)
    }

    pub fn images(&self) -> &[TextureRef] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Bumped on every mutation
    pub fn version(&self) -> u64 {
        self.version
    }
}
