//! Draw modules
//!
//! [`DrawModule`] carries everything the draw kinds share: the parent target,
//! the lazily built chain and pipeline, a transform mirror indexed by slot and
//! the per-frame record-or-advance decision. A [`DrawKind`] supplies the
//! asset requests, any extra device data and the recording itself.

mod draw_module;
mod model;
mod sprite;
mod tex2d;

pub use draw_module::{DrawKind, DrawModule, DrawState};
pub use model::{ModelKind, ModelData};
pub use sprite::{SpriteKind, SpriteData, SpriteMeta};
pub use tex2d::{Tex2dKind, Tex2dData};

/// Draws indexed models resolved through the model broker
pub type DrawModel = DrawModule<ModelKind>;

/// Draws instanced sprites sampling the shared texture array
pub type DrawSprite = DrawModule<SpriteKind>;

/// Draws one textured quad per placement
pub type DrawTex2d = DrawModule<Tex2dKind>;
