/// Image combiner - layers several images into one

use std::any::Any;
use std::sync::{Arc, Mutex};
use serde_json::Value;
use winit::dpi::PhysicalSize;
use loom_engine::bus::{Bus, Link, Requirement, WaitStatus};
use loom_engine::config::set_indexed;
use loom_engine::gpu::{
    ChainCycle, ChainDesc, CycleOutcome, Device, DeviceId, Image, ImageLink, Pipeline, PipelineDesc,
    PipelineKind, RenderPassDesc, SharedChain, SharedRenderPass, SubpassDesc,
};
use loom_engine::loom::{Module, ModuleContext, Result, Services};
use loom_engine::resource::{GateStatus, ResourceGate};
use loom_engine::utils::lock;
use loom_engine::{engine_debug, engine_info, engine_warn};
use crate::ports;

/// Inputs beyond this many are ignored
pub const MAX_INPUTS: usize = 10;

const DEFAULT_EXTENT: PhysicalSize<u32> = PhysicalSize::new(1280, 1024);

/// Full-screen quad
const QUAD_VERTICES: u32 = 6;

struct CombinerState {
    device: Option<DeviceId>,
    extent: PhysicalSize<u32>,
    resized: bool,
    images: Vec<Option<ImageLink>>,
    shader: Vec<u8>,
    outputs: Vec<String>,
}

impl Default for CombinerState {
    fn default() -> Self {
        Self {
            device: None,
            extent: DEFAULT_EXTENT,
            resized: false,
            images: Vec::new(),
            shader: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

impl CombinerState {
    fn set_width(&mut self, width: u32) {
        self.resized |= self.extent.width != width;
        self.extent.width = width;
    }

    fn set_height(&mut self, height: u32) {
        self.resized |= self.extent.height != height;
        self.extent.height = height;
    }

    /// Every configured input still alive, in input order
    fn live_images(&self) -> Option<Vec<Arc<dyn Image>>> {
        self.images
            .iter()
            .map(|link| link.as_ref().and_then(|l| l.upgrade()))
            .collect()
    }
}

struct CombinerGpu {
    device: Arc<dyn Device>,
    pass: SharedRenderPass,
    chain: SharedChain,
    pipeline: Arc<dyn Pipeline>,
}

/// Draws its input images, in input order, into one offscreen target
///
/// Ports: `::device`, `::width` and `::height` (default 1280x1024),
/// `::inputs` (up to [`MAX_INPUTS`] Required names carrying an
/// [`ImageLink`]), `::shader` (path) or `::shader_bytes`, and `::outputs`
/// (names receiving the combined image link).
///
/// A frame on which every input arrived draws and emits; other frames advance.
pub struct ImageCombiner {
    name: String,
    state: Arc<Mutex<CombinerState>>,
    bus: Option<Bus>,
    services: Option<Services>,
    gate: ResourceGate,
    gpu: Option<CombinerGpu>,
    combined: usize,
}

impl ImageCombiner {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(CombinerState::default())),
            bus: None,
            services: None,
            gate: ResourceGate::new("ImageCombiner"),
            gpu: None,
            combined: 0,
        }
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    pub fn extent(&self) -> PhysicalSize<u32> {
        lock(&self.state).extent
    }

    /// Frames that drew the inputs
    pub fn combined_frames(&self) -> usize {
        self.combined
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(err) = gpu.device.wait_idle() {
                engine_warn!("loom::ImageCombiner", "[{}] wait_idle failed: {}", self.name, err);
            }
        }
    }

    fn subscribe_inputs(&self, bus: &Bus, port: String) {
        let weak_bus = bus.downgrade();
        let weak_state = Arc::downgrade(&self.state);
        let source = port.clone();
        bus.enroll_indexed(port, Requirement::Optional, move |slot, value: &Value| {
            let Some(name) = value.as_str() else {
                engine_warn!("loom::ImageCombiner", "'{}' expects signal names, got {}", source, value);
                return;
            };
            if slot >= MAX_INPUTS {
                engine_warn!("loom::ImageCombiner", "'{}': input {} ('{}') exceeds {} inputs", source, slot, name, MAX_INPUTS);
                return;
            }
            let (Some(bus), Some(state)) = (weak_bus.upgrade(), weak_state.upgrade()) else {
                return;
            };
            set_indexed(&mut lock(&state).images, slot, None);
            bus.enroll_to(&state, name, Requirement::Required, move |s: &mut CombinerState, image: &ImageLink| {
                set_indexed(&mut s.images, slot, Some(image.clone()));
            });
        });
    }
}

impl Default for ImageCombiner {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ImageCombiner {
    fn type_name(&self) -> &'static str {
        "ImageCombiner"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        self.gate = ResourceGate::new(format!("ImageCombiner[{}]", self.name));
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut CombinerState| &mut s.device);
        ports::dimension(bus, &self.state, ctx.port("width"), CombinerState::set_width);
        ports::dimension(bus, &self.state, ctx.port("height"), CombinerState::set_height);
        ports::names(bus, &self.state, ctx.port("outputs"), |s: &mut CombinerState| &mut s.outputs);
        self.subscribe_inputs(bus, ctx.port("inputs"));

        let source = ctx.port("shader");
        bus.enroll_to(&self.state, ctx.port("shader"), Requirement::Optional, move |s: &mut CombinerState, v: &Value| {
            let Some(path) = v.as_str() else {
                engine_warn!("loom::ImageCombiner", "'{}' expects a shader path", source);
                return;
            };
            match std::fs::read(path) {
                Ok(bytes) => s.shader = bytes,
                Err(err) => engine_warn!("loom::ImageCombiner", "'{}': cannot read '{}': {}", source, path, err),
            }
        });
        bus.enroll_to(&self.state, ctx.port("shader_bytes"), Requirement::Optional, |s: &mut CombinerState, bytes: &Vec<u8>| {
            s.shader.clone_from(bytes);
        });

        self.bus = Some(bus.clone());
        self.services = Some(ctx.services().clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let (Some(bus), Some(services)) = (self.bus.clone(), self.services.clone()) else {
            return Ok(());
        };
        let fresh = match bus.wait() {
            WaitStatus::Ready => true,
            WaitStatus::Pending { missing } => {
                engine_debug!("loom::ImageCombiner", "[{}] waiting for {:?}", self.name, missing);
                false
            }
        };

        let (device_id, extent, resized, images, has_shader) = {
            let mut state = lock(&self.state);
            let resized = std::mem::take(&mut state.resized);
            (state.device, state.extent, resized, state.live_images(), !state.shader.is_empty())
        };
        if resized && self.gpu.is_some() {
            engine_info!("loom::ImageCombiner", "[{}] resized to {}x{}", self.name, extent.width, extent.height);
            self.gate.invalidate();
            self.release();
        }

        let device = device_id.and_then(|id| services.devices.get(id));
        let checks = [
            ("device", device.is_some()),
            ("extent", extent.width > 0 && extent.height > 0),
            ("shader", has_shader),
        ];
        let name = self.name.clone();
        let state = &self.state;
        let slot = &mut self.gpu;
        let status = self.gate.poll(&checks, |_generation| {
            let Some(device) = device.clone() else {
                return Ok(());
            };
            let pass = device.create_render_pass(RenderPassDesc {
                name: name.clone(),
                extent,
                subpasses: vec![SubpassDesc::default()],
            })?;
            let chain = device.create_chain(ChainDesc::graphics(format!("{}::chain", name), pass.clone(), 0))?;
            let pipeline = device.create_pipeline(PipelineDesc {
                name: format!("{}::pipeline", name),
                kind: PipelineKind::Graphics,
                shader: lock(state).shader.clone(),
                pass: Some((pass.clone(), 0)),
            })?;
            *slot = Some(CombinerGpu { device, pass, chain, pipeline });
            Ok(())
        })?;

        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        if let GateStatus::Constructed { generation } = status {
            engine_info!("loom::ImageCombiner", "[{}] built generation {} at {}x{}", self.name, generation, extent.width, extent.height);
        }

        // ===== DRAW OR ADVANCE =====
        let images = images.filter(|images| fresh && !images.is_empty());
        let outcome = {
            let mut chain = lock(&gpu.chain);
            if let Some(images) = &images {
                gpu.pipeline.bind_images("images", images)?;
            }
            let count = images.as_ref().map_or(0, Vec::len) as u32;
            let outcome = ChainCycle::record_or_advance(&mut *chain, images.is_some(), |chain| {
                chain.bind(&gpu.pipeline)?;
                chain.push(&count.to_ne_bytes())?;
                chain.draw(QUAD_VERTICES)
            })?;
            if outcome == CycleOutcome::Recorded {
                chain.submit()?;
                chain.synchronize()?;
            }
            outcome
        };

        if outcome == CycleOutcome::Recorded {
            self.combined += 1;
            let Some(output) = lock(&gpu.pass).output() else {
                return Ok(());
            };
            let outputs = lock(&self.state).outputs.clone();
            let link = Link::new(&output);
            for name in &outputs {
                bus.emit_value(name, link.clone());
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "image_combiner_tests.rs"]
mod tests;
