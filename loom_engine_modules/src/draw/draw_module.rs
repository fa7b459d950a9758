/// Draw module - shared lifecycle of every draw kind

use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};
use glam::Mat4;
use serde_json::Value;
use loom_engine::bus::{Bus, Link, Requirement};
use loom_engine::config::set_indexed;
use loom_engine::gpu::{
    BufferUsage, Chain, ChainCycle, ChainDesc, CycleOutcome, Device, DeviceId, Pipeline,
    PipelineDesc, PipelineKind, SharedChain,
};
use loom_engine::loom::asset::RequestKey;
use loom_engine::loom::{Module, ModuleContext, Result, Services};
use loom_engine::resource::{DeviceMirror, DirtyFlags, GateStatus, ResourceGate};
use loom_engine::utils::{lock, SlotPool};
use loom_engine::{engine_debug, engine_info, engine_warn};
use crate::ports;
use crate::signals::{PassTarget, Placement, Recreate, TransformUpdate};

/// What distinguishes one draw module from another
pub trait DrawKind: Send + 'static {
    /// Registered type name
    const TYPE_NAME: &'static str;

    /// Port stem: `"model"` gives `::initial_models`, `::model_input`,
    /// `::model_remove` and `::model_transform`
    const ITEM: &'static str;

    /// Kind-specific host state
    type Data: Default + Send + 'static;

    /// Extra ports
    fn subscribe(_ctx: &ModuleContext, _state: &Arc<Mutex<DrawState<Self::Data>>>) {}

    /// Ask the brokers for the asset of a newly placed drawable
    fn request(services: &Services, state: Weak<Mutex<DrawState<Self::Data>>>, slot: usize, placement: &Placement) -> RequestKey;

    /// Withdraw a request issued by [`DrawKind::request`] that is no longer wanted
    fn cancel(services: &Services, key: RequestKey);

    /// Forget per-slot data of a removed drawable
    fn forget(_data: &mut Self::Data, _slot: usize) {}

    /// Upload kind data and (re)bind it; `rebind` is set after the pipeline was rebuilt
    fn sync(
        _state: &mut DrawState<Self::Data>,
        _services: &Services,
        _device: &dyn Device,
        _copy: &mut dyn Chain,
        _pipeline: &Arc<dyn Pipeline>,
        _rebind: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// Record every drawable into `chain`
    fn record(state: &DrawState<Self::Data>, chain: &mut dyn Chain, pipeline: &Arc<dyn Pipeline>) -> Result<()>;
}

/// Host-side state shared by every draw kind
pub struct DrawState<D> {
    pub device: Option<DeviceId>,
    pub target: Option<PassTarget>,
    pub shader: Vec<u8>,
    pub transform_key: String,
    pub reference: Option<String>,
    pub pool: SlotPool,
    /// Placement of each live slot
    pub placements: Vec<Option<Placement>>,
    pub transforms: DeviceMirror<Mat4>,
    pub dirty: DirtyFlags,
    pub data: D,
    /// Placements whose asset has not been requested yet
    requests: Vec<(usize, Placement)>,
    /// Outstanding broker request of each slot
    tickets: Vec<Option<RequestKey>>,
    /// Requests of removed or replaced drawables, withdrawn on the next execute
    cancelled: Vec<RequestKey>,
    /// Parent changed or asked for recreation
    retarget: bool,
}

impl<D: Default> DrawState<D> {
    fn new(label: &str) -> Self {
        Self {
            device: None,
            target: None,
            shader: Vec::new(),
            transform_key: "transforms".to_string(),
            reference: None,
            pool: SlotPool::new(),
            placements: Vec::new(),
            transforms: DeviceMirror::new(format!("{}::transforms", label), BufferUsage::Storage),
            dirty: DirtyFlags::DRAWABLES,
            data: D::default(),
            requests: Vec::new(),
            tickets: Vec::new(),
            cancelled: Vec::new(),
            retarget: false,
        }
    }
}

impl<D> DrawState<D> {
    /// Add or replace the drawable `placement.id`
    pub fn place(&mut self, placement: Placement) -> usize {
        let slot = self.pool.acquire(&placement.id);
        self.withdraw(slot);
        self.requests.retain(|(pending, _)| *pending != slot);
        self.transforms.set(slot, placement.transform());
        set_indexed(&mut self.placements, slot, Some(placement.clone()));
        self.requests.push((slot, placement));
        self.dirty.insert(DirtyFlags::DRAWABLES | DirtyFlags::METADATA);
        slot
    }

    /// Remove a drawable; returns its freed slot
    pub fn remove(&mut self, id: &str) -> Option<usize> {
        let Some(slot) = self.pool.release(id) else {
            engine_warn!("loom::Draw", "Removing unknown drawable '{}'", id);
            return None;
        };
        self.placements[slot] = None;
        self.requests.retain(|(pending, _)| *pending != slot);
        self.withdraw(slot);
        self.dirty.insert(DirtyFlags::DRAWABLES | DirtyFlags::METADATA);
        Some(slot)
    }

    fn withdraw(&mut self, slot: usize) {
        if let Some(key) = self.tickets.get_mut(slot).and_then(Option::take) {
            self.cancelled.push(key);
        }
    }

    /// Overwrite a drawable's transform; the upload is coalesced until the next sync
    pub fn set_transform(&mut self, id: &str, matrix: Mat4) -> bool {
        match self.pool.get(id) {
            Some(slot) => {
                self.transforms.set(slot, matrix);
                true
            }
            None => {
                engine_warn!("loom::Draw", "Transform for unknown drawable '{}'", id);
                false
            }
        }
    }

    /// Live `(slot, placement)` pairs in slot order
    pub fn live(&self) -> impl Iterator<Item = (usize, &Placement)> {
        self.placements
            .iter()
            .enumerate()
            .filter_map(|(slot, placement)| placement.as_ref().map(|p| (slot, p)))
    }

    /// Whether the asset callback for `slot` still refers to drawable `id`
    pub fn owns(&self, id: &str, slot: usize) -> bool {
        self.pool.get(id) == Some(slot)
    }
}

/// Build a broker callback that applies `apply` if the slot was not reused meanwhile
pub(crate) fn on_asset<D, R>(
    state: Weak<Mutex<DrawState<D>>>,
    id: String,
    slot: usize,
    apply: fn(&mut D, usize, R),
) -> impl FnOnce(&str, R) + Send + 'static
where
    D: Send + 'static,
    R: Send + 'static,
{
    move |asset: &str, reference: R| {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        let current = state.placements.get(slot).and_then(Option::as_ref).is_some_and(|p| p.asset == asset);
        if !state.owns(&id, slot) || !current {
            engine_debug!("loom::Draw", "Dropping '{}' for '{}': drawable was removed or replaced", asset, id);
            return;
        }
        apply(&mut state.data, slot, reference);
        state.dirty.insert(DirtyFlags::DRAWABLES | DirtyFlags::METADATA);
    }
}

struct DrawGpu {
    device: Arc<dyn Device>,
    copy: SharedChain,
    render: SharedChain,
    pipeline: Arc<dyn Pipeline>,
    subpass: u32,
    /// Bindings must be refreshed before the next recording
    rebind: bool,
}

/// Draw module generic over its [`DrawKind`]
///
/// Ports: `::device`, `::parent` (name carrying a [`PassTarget`]),
/// `::recreate` (name carrying [`Recreate`]), `::shader` (path) or
/// `::shader_bytes`, `::transform_key`, `::reference` (name the chain is
/// emitted on, indexed by subpass) plus the drawable ports named after
/// [`DrawKind::ITEM`].
pub struct DrawModule<K: DrawKind> {
    name: String,
    state: Arc<Mutex<DrawState<K::Data>>>,
    bus: Option<Bus>,
    services: Option<Services>,
    gate: ResourceGate,
    gpu: Option<DrawGpu>,
    recorded: usize,
    advanced: usize,
    kind: PhantomData<K>,
}

impl<K: DrawKind> DrawModule<K> {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(DrawState::new(K::TYPE_NAME))),
            bus: None,
            services: None,
            gate: ResourceGate::new(K::TYPE_NAME),
            gpu: None,
            recorded: 0,
            advanced: 0,
            kind: PhantomData,
        }
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    /// Frames that recorded new commands
    pub fn recorded_frames(&self) -> usize {
        self.recorded
    }

    /// Frames that only advanced the chain
    pub fn advanced_frames(&self) -> usize {
        self.advanced
    }

    /// Number of live drawables
    pub fn drawable_count(&self) -> usize {
        lock(&self.state).pool.len()
    }

    /// Inspect the host state
    pub fn with_state<T>(&self, inspect: impl FnOnce(&DrawState<K::Data>) -> T) -> T {
        inspect(&lock(&self.state))
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(err) = gpu.device.wait_idle() {
                engine_warn!("loom::Draw", "[{}] wait_idle failed: {}", self.name, err);
            }
        }
    }

    /// Withdraw stale requests, then issue the queued ones
    fn issue_requests(&self, services: &Services) {
        let (cancelled, requests) = {
            let mut state = lock(&self.state);
            (std::mem::take(&mut state.cancelled), std::mem::take(&mut state.requests))
        };
        for key in cancelled {
            K::cancel(services, key);
        }
        // Brokers are locked without the state lock held; callbacks take it.
        let issued: Vec<(usize, String, RequestKey)> = requests
            .iter()
            .map(|(slot, placement)| {
                (*slot, placement.id.clone(), K::request(services, Arc::downgrade(&self.state), *slot, placement))
            })
            .collect();
        let stale: Vec<RequestKey> = {
            let mut state = lock(&self.state);
            issued
                .into_iter()
                .filter_map(|(slot, id, key)| {
                    if state.owns(&id, slot) {
                        set_indexed(&mut state.tickets, slot, Some(key));
                        None
                    } else {
                        Some(key)
                    }
                })
                .collect()
        };
        for key in stale {
            K::cancel(services, key);
        }
    }

    fn subscribe_items(&self, ctx: &ModuleContext) {
        let bus = ctx.bus();
        let item = K::ITEM;

        let source = ctx.port(&format!("initial_{}s", item));
        bus.enroll_to(&self.state, source.clone(), Requirement::Optional, move |s: &mut DrawState<K::Data>, v: &Value| {
            match serde_json::from_value::<Vec<Placement>>(v.clone()) {
                Ok(placements) => {
                    for placement in placements {
                        s.place(placement);
                    }
                }
                Err(err) => engine_warn!("loom::Draw", "'{}' is not a placement list: {}", source, err),
            }
        });
        ports::follow(bus, &self.state, ctx.port(&format!("{}_input", item)), Requirement::Optional, |s: &mut DrawState<K::Data>, p: &Placement| {
            s.place(p.clone());
        });
        ports::follow(bus, &self.state, ctx.port(&format!("{}_remove", item)), Requirement::Optional, |s: &mut DrawState<K::Data>, id: &String| {
            if let Some(slot) = s.remove(id) {
                K::forget(&mut s.data, slot);
            }
        });
        ports::follow(bus, &self.state, ctx.port(&format!("{}_transform", item)), Requirement::Optional, |s: &mut DrawState<K::Data>, t: &TransformUpdate| {
            s.set_transform(&t.id, t.matrix);
        });
    }
}

impl<K: DrawKind> Default for DrawModule<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DrawKind> Module for DrawModule<K> {
    fn type_name(&self) -> &'static str {
        K::TYPE_NAME
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        self.gate = ResourceGate::new(format!("{}[{}]", K::TYPE_NAME, self.name));
        *lock(&self.state) = DrawState::new(&self.name);
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut DrawState<K::Data>| &mut s.device);
        ports::follow(bus, &self.state, ctx.port("parent"), Requirement::Optional, |s: &mut DrawState<K::Data>, t: &PassTarget| {
            s.target = Some(t.clone());
            s.retarget = true;
        });
        ports::follow(bus, &self.state, ctx.port("recreate"), Requirement::Optional, |s: &mut DrawState<K::Data>, _: &Recreate| {
            // The parent's objects are gone; a fresh target follows once it is rebuilt.
            s.target = None;
            s.retarget = true;
        });
        let source = ctx.port("shader");
        bus.enroll_to(&self.state, ctx.port("shader"), Requirement::Optional, move |s: &mut DrawState<K::Data>, v: &Value| {
            let Some(path) = v.as_str() else {
                engine_warn!("loom::Draw", "'{}' expects a shader path", source);
                return;
            };
            match std::fs::read(path) {
                Ok(bytes) => s.shader = bytes,
                Err(err) => engine_warn!("loom::Draw", "'{}': cannot read '{}': {}", source, path, err),
            }
        });
        bus.enroll_to(&self.state, ctx.port("shader_bytes"), Requirement::Optional, |s: &mut DrawState<K::Data>, bytes: &Vec<u8>| {
            s.shader = bytes.clone();
        });
        bus.enroll_to(&self.state, ctx.port("transform_key"), Requirement::Optional, |s: &mut DrawState<K::Data>, v: &Value| {
            if let Some(key) = v.as_str() {
                s.transform_key = key.to_string();
            }
        });
        ports::name(bus, &self.state, ctx.port("reference"), |s: &mut DrawState<K::Data>| &mut s.reference);
        self.subscribe_items(ctx);
        K::subscribe(ctx, &self.state);

        self.bus = Some(bus.clone());
        self.services = Some(ctx.services().clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let (Some(bus), Some(services)) = (self.bus.clone(), self.services.clone()) else {
            return Ok(());
        };
        self.issue_requests(&services);

        let (device_id, target, shader, retarget) = {
            let mut state = lock(&self.state);
            let retarget = std::mem::take(&mut state.retarget);
            (state.device, state.target.clone(), state.shader.clone(), retarget)
        };
        let parent_alive = target.as_ref().is_some_and(PassTarget::is_alive);
        if self.gpu.is_some() && (retarget || !parent_alive) {
            engine_info!("loom::Draw", "[{}] parent changed; rebuilding", self.name);
            self.gate.invalidate();
            self.release();
        }

        // ===== LAZY CONSTRUCTION =====
        let device = device_id.and_then(|id| services.devices.get(id));
        let chain = target.as_ref().and_then(|t| t.chain.upgrade());
        let pass = target.as_ref().and_then(|t| t.pass.upgrade());
        let subpass = target.as_ref().map_or(0, |t| t.subpass);
        let subpass_valid = pass.as_ref().is_some_and(|p| subpass < lock(p).subpass_count());
        let checks = [
            ("device", device.is_some()),
            ("parent chain", chain.is_some()),
            ("parent pass", pass.is_some()),
            ("subpass", subpass_valid),
            ("pipeline", !shader.is_empty()),
        ];
        let name = self.name.clone();
        let slot = &mut self.gpu;
        let status = self.gate.poll(&checks, |_generation| {
            let (Some(device), Some(pass)) = (device.clone(), pass.clone()) else {
                return Ok(());
            };
            let render = device.create_chain(ChainDesc::graphics(format!("{}::render", name), pass.clone(), subpass))?;
            let copy = device.create_chain(ChainDesc::transfer(format!("{}::copy", name)))?;
            let pipeline = device.create_pipeline(PipelineDesc {
                name: format!("{}::pipeline", name),
                kind: PipelineKind::Graphics,
                shader,
                pass: Some((pass, subpass)),
            })?;
            *slot = Some(DrawGpu { device, copy, render, pipeline, subpass, rebind: true });
            Ok(())
        })?;
        drop(chain);

        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        if let GateStatus::Constructed { generation } = status {
            engine_info!("loom::Draw", "[{}] built generation {} in subpass {}", self.name, generation, gpu.subpass);
            let mut state = lock(&self.state);
            state.transforms.mark_dirty();
            state.dirty.insert(DirtyFlags::all());
        }

        // ===== HOST -> DEVICE =====
        let outcome = {
            let mut state = lock(&self.state);
            let rebind = std::mem::take(&mut gpu.rebind);
            {
                let mut copy = lock(&gpu.copy);
                state.transforms.sync(gpu.device.as_ref(), &mut *copy)?;
                if state.transforms.take_reallocated() || rebind {
                    if let Some(buffer) = state.transforms.buffer() {
                        gpu.pipeline.bind_buffer(&state.transform_key, buffer)?;
                    }
                }
                K::sync(&mut state, &services, gpu.device.as_ref(), &mut *copy, &gpu.pipeline, rebind)?;
            }

            // ===== RECORD OR ADVANCE =====
            let dirty = state.dirty.take(DirtyFlags::DRAWABLES);
            let pipeline = gpu.pipeline.clone();
            let mut render = lock(&gpu.render);
            let outcome = ChainCycle::record_or_advance(&mut *render, dirty, |chain| K::record(&state, chain, &pipeline));
            if outcome.is_err() && dirty {
                state.dirty.insert(DirtyFlags::DRAWABLES);
            }
            outcome?
        };

        match outcome {
            CycleOutcome::Recorded => {
                self.recorded += 1;
                let reference = lock(&self.state).reference.clone();
                if let Some(reference) = reference {
                    bus.emit_indexed(&reference, Link::new(&gpu.render), gpu.subpass as usize);
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
#[path = "draw_module_tests.rs"]
mod tests;
