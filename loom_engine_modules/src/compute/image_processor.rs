/// Image processor - shared lifecycle of every compute module

use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use serde_json::Value;
use winit::dpi::PhysicalSize;
use loom_engine::bus::{Bus, Link, Requirement, WaitStatus};
use loom_engine::config::set_indexed;
use loom_engine::gpu::{
    Chain, ChainCycle, ChainDesc, CycleOutcome, Device, DeviceId, Image, ImageDesc, ImageFormat,
    ImageLink, Pipeline, PipelineDesc, PipelineKind, SharedChain,
};
use loom_engine::loom::{Module, ModuleContext, Result, Services};
use loom_engine::resource::{GateStatus, ResourceGate};
use loom_engine::utils::lock;
use loom_engine::{engine_debug, engine_info, engine_warn};
use crate::ports;

/// Edge of the square work group every compute shader declares
pub const WORK_GROUP_SIZE: u32 = 32;

/// Work groups covering `extent`, rounding partial groups up
pub fn work_groups(extent: PhysicalSize<u32>) -> (u32, u32) {
    (extent.width.div_ceil(WORK_GROUP_SIZE), extent.height.div_ceil(WORK_GROUP_SIZE))
}

/// What distinguishes one compute module from another
pub trait ComputeKind: Send + 'static {
    /// Registered type name
    const TYPE_NAME: &'static str;

    /// One compute pipeline per stage, built from `::shaders` in this order
    const STAGES: &'static [&'static str];

    const OUTPUT_FORMAT: ImageFormat = ImageFormat::Rgba32f;

    /// Tunables set through kind-specific ports
    type Params: Default + Send + 'static;

    /// Extra device objects living as long as the output image
    type Scratch: Send + 'static;

    /// Extra ports
    fn subscribe(_ctx: &ModuleContext, _state: &Arc<Mutex<ProcessorState<Self::Params>>>) {}

    /// Build the scratch objects for an input of `extent`
    fn build(device: &dyn Device, name: &str, extent: PhysicalSize<u32>) -> Result<Self::Scratch>;

    /// Bind the images and scratch objects into the stage pipelines
    fn bind(
        pipelines: &[Arc<dyn Pipeline>],
        input: &Arc<dyn Image>,
        output: &Arc<dyn Image>,
        scratch: &Self::Scratch,
    ) -> Result<()>;

    /// Record the dispatches of one run
    fn record(
        chain: &mut dyn Chain,
        pipelines: &[Arc<dyn Pipeline>],
        params: &Self::Params,
        extent: PhysicalSize<u32>,
    ) -> Result<()>;
}

/// Host-side state shared by every compute kind
pub struct ProcessorState<P> {
    pub device: Option<DeviceId>,
    pub input: Option<ImageLink>,
    /// Shader bytes of each stage
    pub shaders: Vec<Vec<u8>>,
    pub outputs: Vec<String>,
    pub params: P,
}

impl<P: Default> Default for ProcessorState<P> {
    fn default() -> Self {
        Self {
            device: None,
            input: None,
            shaders: Vec::new(),
            outputs: Vec::new(),
            params: P::default(),
        }
    }
}

impl<P> ProcessorState<P> {
    fn shaders_ready(&self, stages: usize) -> bool {
        self.shaders.len() >= stages && self.shaders.iter().take(stages).all(|bytes| !bytes.is_empty())
    }
}

struct ProcessorGpu<S> {
    device: Arc<dyn Device>,
    chain: SharedChain,
    pipelines: Vec<Arc<dyn Pipeline>>,
    output: Arc<dyn Image>,
    extent: PhysicalSize<u32>,
    scratch: S,
}

/// Compute module generic over its [`ComputeKind`]
///
/// Ports: `::device`, `::input` (Required name carrying an [`ImageLink`]),
/// `::shaders` (one path per stage) or `::shader_bytes` (indexed by stage),
/// `::outputs` (names receiving the output image link) plus the kind's own.
///
/// A frame on which the input arrived binds it, dispatches every stage,
/// submits, waits for completion and emits the output. Any other frame only
/// advances the chain. The output image follows the input's extent.
pub struct ImageProcessor<K: ComputeKind> {
    name: String,
    state: Arc<Mutex<ProcessorState<K::Params>>>,
    bus: Option<Bus>,
    services: Option<Services>,
    gate: ResourceGate,
    gpu: Option<ProcessorGpu<K::Scratch>>,
    dispatched: usize,
    advanced: usize,
    kind: PhantomData<K>,
}

impl<K: ComputeKind> ImageProcessor<K> {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(ProcessorState::default())),
            bus: None,
            services: None,
            gate: ResourceGate::new(K::TYPE_NAME),
            gpu: None,
            dispatched: 0,
            advanced: 0,
            kind: PhantomData,
        }
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    /// Frames that dispatched the stages
    pub fn dispatched_frames(&self) -> usize {
        self.dispatched
    }

    /// Frames that only advanced the chain
    pub fn advanced_frames(&self) -> usize {
        self.advanced
    }

    /// Inspect the host state
    pub fn with_state<T>(&self, inspect: impl FnOnce(&ProcessorState<K::Params>) -> T) -> T {
        inspect(&lock(&self.state))
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(err) = gpu.device.wait_idle() {
                engine_warn!("loom::Compute", "[{}] wait_idle failed: {}", self.name, err);
            }
        }
    }

    fn subscribe_shaders(&self, ctx: &ModuleContext) {
        let bus = ctx.bus();
        let source = ctx.port("shaders");
        bus.enroll_indexed_to(&self.state, ctx.port("shaders"), Requirement::Optional, move |s: &mut ProcessorState<K::Params>, stage, v: &Value| {
            let Some(path) = v.as_str() else {
                engine_warn!("loom::Compute", "'{}' expects shader paths", source);
                return;
            };
            match std::fs::read(path) {
                Ok(bytes) => set_indexed(&mut s.shaders, stage, bytes),
                Err(err) => engine_warn!("loom::Compute", "'{}': cannot read '{}': {}", source, path, err),
            }
        });
        bus.enroll_indexed_to(&self.state, ctx.port("shader_bytes"), Requirement::Optional, |s: &mut ProcessorState<K::Params>, stage, bytes: &Vec<u8>| {
            set_indexed(&mut s.shaders, stage, bytes.clone());
        });
    }
}

impl<K: ComputeKind> Default for ImageProcessor<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ComputeKind> Module for ImageProcessor<K> {
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        self.gate = ResourceGate::new(format!("{}[{}]", K::TYPE_NAME, self.name));
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut ProcessorState<K::Params>| &mut s.device);
        ports::follow(bus, &self.state, ctx.port("input"), Requirement::Required, |s: &mut ProcessorState<K::Params>, image: &ImageLink| {
            s.input = Some(image.clone());
        });
        ports::names(bus, &self.state, ctx.port("outputs"), |s: &mut ProcessorState<K::Params>| &mut s.outputs);
        self.subscribe_shaders(ctx);
        K::subscribe(ctx, &self.state);

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
                engine_debug!("loom::Compute", "[{}] waiting for {:?}", self.name, missing);
                false
            }
        };

        let (device_id, input, shaders_ready) = {
            let state = lock(&self.state);
            (state.device, state.input.clone(), state.shaders_ready(K::STAGES.len()))
        };
        let input = input.and_then(|link| link.upgrade());
        let reshaped = match (&self.gpu, &input) {
            (Some(gpu), Some(image)) => fresh && gpu.extent != image.extent(),
            _ => false,
        };
        if reshaped {
            engine_info!("loom::Compute", "[{}] input reshaped; rebuilding", self.name);
            self.gate.invalidate();
            self.release();
        }

        // ===== LAZY CONSTRUCTION =====
        let device = device_id.and_then(|id| services.devices.get(id));
        let checks = [
            ("device", device.is_some()),
            ("input", input.is_some()),
            ("shaders", shaders_ready),
        ];
        let name = self.name.clone();
        let state = &self.state;
        let slot = &mut self.gpu;
        let status = self.gate.poll(&checks, |_generation| {
            let (Some(device), Some(image)) = (device.clone(), input.clone()) else {
                return Ok(());
            };
            let extent = image.extent();
            let chain = device.create_chain(ChainDesc::compute(format!("{}::compute", name)))?;
            let shaders = lock(state).shaders.clone();
            let pipelines = K::STAGES
                .iter()
                .zip(shaders)
                .map(|(stage, shader)| {
                    device.create_pipeline(PipelineDesc {
                        name: format!("{}::{}", name, stage),
                        kind: PipelineKind::Compute,
                        shader,
                        pass: None,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let output = device.create_image(ImageDesc {
                name: format!("{}::output", name),
                extent,
                format: K::OUTPUT_FORMAT,
            })?;
            let scratch = K::build(device.as_ref(), &name, extent)?;
            *slot = Some(ProcessorGpu { device, chain, pipelines, output, extent, scratch });
            Ok(())
        })?;

        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        if let GateStatus::Constructed { generation } = status {
            engine_info!("loom::Compute", "[{}] built generation {} for {}x{}", self.name, generation, gpu.extent.width, gpu.extent.height);
        }

        // ===== DISPATCH OR ADVANCE =====
        let outcome = {
            let state = lock(&self.state);
            let mut chain = lock(&gpu.chain);
            let dispatch = match (&input, fresh) {
                (Some(image), true) => {
                    K::bind(&gpu.pipelines, image, &gpu.output, &gpu.scratch)?;
                    true
                }
                _ => false,
            };
            let outcome = ChainCycle::record_or_advance(&mut *chain, dispatch, |chain| {
                K::record(chain, &gpu.pipelines, &state.params, gpu.extent)
            })?;
            if outcome == CycleOutcome::Recorded {
                chain.submit()?;
                chain.synchronize()?;
            }
            outcome
        };

        match outcome {
            CycleOutcome::Recorded => {
                self.dispatched += 1;
                let outputs = lock(&self.state).outputs.clone();
                let link = Link::new(&gpu.output);
                for output in &outputs {
                    bus.emit_value(output, link.clone());
                }
            }
            CycleOutcome::Advanced => self.advanced += 1,
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
#[path = "image_processor_tests.rs"]
mod tests;
