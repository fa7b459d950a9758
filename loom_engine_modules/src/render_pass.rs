/// Render pass module - owns the presentable pass and the chain its children
/// record into

use std::any::Any;
use std::sync::{Arc, Mutex};
use glam::Mat4;
use serde_json::Value;
use winit::dpi::PhysicalSize;
use loom_engine::bus::{Bus, Link, Requirement};
use loom_engine::config::value_f32;
use loom_engine::gpu::{
    ChainDesc, ChainLink, Device, DeviceId, PresentStatus, RenderPassDesc, SharedChain,
    SharedRenderPass, SubpassDesc,
};
use loom_engine::loom::{Module, ModuleContext, Result, Services};
use loom_engine::resource::{GateStatus, ResourceGate};
use loom_engine::utils::lock;
use loom_engine::{engine_info, engine_warn};
use crate::ports;
use crate::signals::{PassTarget, Recreate};

const DEFAULT_FOV_DEGREES: f32 = 60.0;

struct PassState {
    device: Option<DeviceId>,
    extent: PhysicalSize<u32>,
    fov: f32,
    subpasses: Vec<SubpassDesc>,
    outputs: Vec<String>,
    projection: Vec<String>,
    children: Vec<Option<ChainLink>>,
    recreate: Option<String>,
    finish: Option<String>,
    resized: bool,
}

impl Default for PassState {
    fn default() -> Self {
        Self {
            device: None,
            extent: PhysicalSize::new(0, 0),
            fov: DEFAULT_FOV_DEGREES,
            subpasses: Vec::new(),
            outputs: Vec::new(),
            projection: Vec::new(),
            children: Vec::new(),
            recreate: None,
            finish: None,
            resized: false,
        }
    }
}

impl PassState {
    fn set_width(&mut self, width: u32) {
        if self.extent.width != width {
            self.extent.width = width;
            self.resized = true;
        }
    }

    fn set_height(&mut self, height: u32) {
        if self.extent.height != height {
            self.extent.height = height;
            self.resized = true;
        }
    }

    fn projection_matrix(&self) -> Mat4 {
        let aspect = self.extent.width.max(1) as f32 / self.extent.height.max(1) as f32;
        Mat4::perspective_rh(self.fov.to_radians(), aspect, 0.1, 1000.0)
    }
}

struct PassGpu {
    device: Arc<dyn Device>,
    pass: SharedRenderPass,
    chain: SharedChain,
    generation: u64,
}

/// Render pass with subpasses, presented once per frame
///
/// Ports: `::device`, `::width`, `::height`, `::fov`, `::subpasses`,
/// `::outputs` (one name per subpass, receiving a [`PassTarget`]),
/// `::projection` (names receiving the projection matrix), `::draw_inputs`
/// (names on which children emit their chains), `::recreate` (name on which
/// [`Recreate`] is broadcast after surface loss) and `::finish_signal` (name
/// receiving the presented image).
///
/// Children's chains are combined in `::draw_inputs` order.
pub struct RenderPassModule {
    name: String,
    state: Arc<Mutex<PassState>>,
    bus: Option<Bus>,
    services: Option<Services>,
    gate: ResourceGate,
    gpu: Option<PassGpu>,
}

impl RenderPassModule {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(PassState::default())),
            bus: None,
            services: None,
            gate: ResourceGate::new("RenderPass"),
            gpu: None,
        }
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    /// Link to the pass chain, once built
    pub fn chain(&self) -> Option<ChainLink> {
        self.gpu.as_ref().map(|gpu| Link::new(&gpu.chain))
    }

    pub fn extent(&self) -> PhysicalSize<u32> {
        lock(&self.state).extent
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(err) = gpu.device.wait_idle() {
                engine_warn!("loom::RenderPass", "[{}] wait_idle failed: {}", self.name, err);
            }
        }
    }

    /// Hand every child its target and the projection matrix
    fn announce(&self, bus: &Bus, gpu: &PassGpu) {
        let (outputs, projection_names, projection) = {
            let state = lock(&self.state);
            (state.outputs.clone(), state.projection.clone(), state.projection_matrix())
        };
        let subpasses = lock(&gpu.pass).subpass_count();
        for (index, name) in outputs.iter().enumerate() {
            if index as u32 >= subpasses {
                engine_warn!("loom::RenderPass", "[{}] output '{}' has no subpass {}", self.name, name, index);
            }
            bus.emit_value(
                name,
                PassTarget { chain: Link::new(&gpu.chain), pass: Link::new(&gpu.pass), subpass: index as u32 },
            );
        }
        for name in &projection_names {
            bus.emit_value(name, projection);
        }
    }

    /// Combine the children in input order, submit and present
    fn present(&self, gpu: &PassGpu) -> Result<PresentStatus> {
        let children: Vec<ChainLink> = lock(&self.state).children.iter().flatten().cloned().collect();
        let mut chain = lock(&gpu.chain);
        chain.begin()?;
        for link in &children {
            // A child torn down mid-run simply stops contributing.
            if let Some(child) = link.upgrade() {
                let child = lock(&child);
                chain.combine(&*child)?;
            }
        }
        chain.end()?;
        chain.submit()?;
        let status = lock(&gpu.pass).present(&mut *chain)?;
        Ok(status)
    }

    /// Drop the pass objects and tell the children to let go of them
    fn teardown(&mut self, bus: &Bus) {
        let generation = self.gpu.as_ref().map_or(0, |gpu| gpu.generation);
        self.gate.invalidate();
        self.release();
        let recreate = lock(&self.state).recreate.clone();
        if let Some(recreate) = recreate {
            bus.emit_value(&recreate, Recreate { generation });
        }
    }
}

impl Default for RenderPassModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for RenderPassModule {
    fn type_name(&self) -> &'static str {
        "RenderPass"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        self.gate = ResourceGate::new(format!("RenderPass[{}]", self.name));
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut PassState| &mut s.device);
        ports::dimension(bus, &self.state, ctx.port("width"), PassState::set_width);
        ports::dimension(bus, &self.state, ctx.port("height"), PassState::set_height);
        bus.enroll_to(&self.state, ctx.port("fov"), Requirement::Optional, |s: &mut PassState, v: &Value| {
            if let Some(fov) = value_f32(v) {
                s.fov = fov;
            }
        });
        let source = ctx.port("subpasses");
        bus.enroll_to(&self.state, ctx.port("subpasses"), Requirement::Optional, move |s: &mut PassState, v: &Value| {
            match serde_json::from_value::<Vec<SubpassDesc>>(v.clone()) {
                Ok(subpasses) => s.subpasses = subpasses,
                Err(err) => engine_warn!("loom::RenderPass", "'{}' is not a subpass list: {}", source, err),
            }
        });
        ports::names(bus, &self.state, ctx.port("outputs"), |s: &mut PassState| &mut s.outputs);
        ports::names(bus, &self.state, ctx.port("projection"), |s: &mut PassState| &mut s.projection);
        ports::follow_indexed(
            bus,
            &self.state,
            ctx.port("draw_inputs"),
            Requirement::Optional,
            |s: &mut PassState, slot, link: &ChainLink| loom_engine::config::set_indexed(&mut s.children, slot, Some(link.clone())),
        );
        ports::name(bus, &self.state, ctx.port("recreate"), |s: &mut PassState| &mut s.recreate);
        ports::name(bus, &self.state, ctx.port("finish_signal"), |s: &mut PassState| &mut s.finish);

        self.bus = Some(bus.clone());
        self.services = Some(ctx.services().clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let (Some(bus), Some(services)) = (self.bus.clone(), self.services.clone()) else {
            return Ok(());
        };

        let (device_id, extent, subpasses, resized) = {
            let mut state = lock(&self.state);
            let resized = std::mem::take(&mut state.resized);
            (state.device, state.extent, state.subpasses.clone(), resized)
        };
        if resized && self.gpu.is_some() {
            engine_info!("loom::RenderPass", "[{}] resized to {}x{}", self.name, extent.width, extent.height);
            self.teardown(&bus);
        }

        let device = device_id.and_then(|id| services.devices.get(id));
        let checks = [
            ("device", device.is_some()),
            ("extent", extent.width > 0 && extent.height > 0),
            ("subpasses", !subpasses.is_empty()),
        ];
        let name = self.name.clone();
        let slot = &mut self.gpu;
        let status = self.gate.poll(&checks, |generation| {
            let Some(device) = device.clone() else {
                return Ok(());
            };
            let pass = device.create_render_pass(RenderPassDesc {
                name: name.clone(),
                extent,
                subpasses,
            })?;
            let chain = device.create_chain(ChainDesc::graphics(format!("{}::chain", name), pass.clone(), 0))?;
            *slot = Some(PassGpu { device, pass, chain, generation });
            Ok(())
        })?;

        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        if matches!(status, GateStatus::Constructed { .. }) {
            self.announce(&bus, gpu);
        }

        match self.present(gpu)? {
            PresentStatus::Presented => {
                let finish = lock(&self.state).finish.clone();
                let image = lock(&gpu.pass).output();
                if let (Some(finish), Some(image)) = (finish, image) {
                    bus.emit_value(&finish, Link::new(&image));
                }
            }
            PresentStatus::SurfaceLost => {
                engine_warn!("loom::RenderPass", "[{}] surface lost; children must recreate", self.name);
                self.teardown(&bus);
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
