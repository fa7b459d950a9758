/*!
# Loom Engine - Built-in Modules

Concrete modules for the Loom dataflow engine: a camera, a render pass that
combines its children's chains and presents them, draw modules for models,
sprites and textured quads, an asset database driving the request brokers,
a window sink, a host-image converter, compute image processors, an image
combiner and a GPU barrier.

Every module follows the same protocol: enroll and publish in `subscribe`,
build GPU objects lazily behind a [`ResourceGate`](loom_engine::resource::ResourceGate)
in `execute`, and end each frame with an emission or a chain advance.

```no_run
use loom_engine::loom::{Engine, EngineConfig, GraphConfig, ModuleRegistry};

let mut registry = ModuleRegistry::new();
loom_engine_modules::register_builtin_modules(&mut registry)?;

let graph = GraphConfig::from_path("graph.json")?;
let mut engine = Engine::new(EngineConfig::default());
engine.load(&graph, &registry)?;
engine.start()?;
# Ok::<(), loom_engine::loom::Error>(())
```
*/

mod ports;
mod signals;
mod camera;
mod render_pass;
mod database;
mod window;
mod image_converter;
mod image_combiner;
mod gpu_barrier;
pub mod draw;
pub mod compute;

pub use signals::{PassTarget, Placement, Recreate, TransformUpdate};
pub use camera::Camera;
pub use render_pass::RenderPassModule;
pub use database::AssetDatabase;
pub use window::Window;
pub use image_converter::ImageConverter;
pub use draw::{DrawModel, DrawSprite, DrawTex2d};
pub use image_combiner::{ImageCombiner, MAX_INPUTS};
pub use gpu_barrier::GpuBarrier;
pub use compute::{Binarize, ConnectedComponents};

use loom_engine::loom::{Module, ModuleDescriptor, ModuleRegistry, Result};

fn make_camera() -> Box<dyn Module> {
    Box::new(Camera::new())
}

fn make_render_pass() -> Box<dyn Module> {
    Box::new(RenderPassModule::new())
}

fn make_draw_model() -> Box<dyn Module> {
    Box::new(DrawModel::new())
}

fn make_draw_sprite() -> Box<dyn Module> {
    Box::new(DrawSprite::new())
}

fn make_draw_tex2d() -> Box<dyn Module> {
    Box::new(DrawTex2d::new())
}

fn make_asset_database() -> Box<dyn Module> {
    Box::new(AssetDatabase::new())
}

fn make_window() -> Box<dyn Module> {
    Box::new(Window::new())
}

fn make_image_converter() -> Box<dyn Module> {
    Box::new(ImageConverter::new())
}

fn make_image_combiner() -> Box<dyn Module> {
    Box::new(ImageCombiner::new())
}

fn make_gpu_barrier() -> Box<dyn Module> {
    Box::new(GpuBarrier::new())
}

fn make_binarize() -> Box<dyn Module> {
    Box::new(Binarize::new())
}

fn make_connected_components() -> Box<dyn Module> {
    Box::new(ConnectedComponents::new())
}

/// Every module type this crate provides
pub static BUILTIN_MODULES: &[ModuleDescriptor] = &[
    ModuleDescriptor { type_name: "Camera", version: 1, make: make_camera },
    ModuleDescriptor { type_name: "RenderPass", version: 1, make: make_render_pass },
    ModuleDescriptor { type_name: "DrawModel", version: 1, make: make_draw_model },
    ModuleDescriptor { type_name: "DrawSprite", version: 1, make: make_draw_sprite },
    ModuleDescriptor { type_name: "DrawTex2d", version: 1, make: make_draw_tex2d },
    ModuleDescriptor { type_name: "AssetDatabase", version: 1, make: make_asset_database },
    ModuleDescriptor { type_name: "Window", version: 1, make: make_window },
    ModuleDescriptor { type_name: "ImageConverter", version: 1, make: make_image_converter },
    ModuleDescriptor { type_name: "ImageCombiner", version: 1, make: make_image_combiner },
    ModuleDescriptor { type_name: "GpuBarrier", version: 1, make: make_gpu_barrier },
    ModuleDescriptor { type_name: "Binarize", version: 1, make: make_binarize },
    ModuleDescriptor { type_name: "ConnectedComponents", version: 1, make: make_connected_components },
];

/// Register every built-in module type
///
/// # Errors
///
/// `DuplicateModule` if one of the type names is already registered.
pub fn register_builtin_modules(registry: &mut ModuleRegistry) -> Result<()> {
    registry.register_table(BUILTIN_MODULES)
}
