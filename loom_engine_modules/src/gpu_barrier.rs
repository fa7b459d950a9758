/// GPU barrier - holds downstream modules until upstream GPU work drained

use std::any::Any;
use std::sync::{Arc, Mutex};
use serde_json::Value;
use loom_engine::bus::{Bus, Requirement, WaitStatus};
use loom_engine::gpu::DeviceId;
use loom_engine::loom::{Module, ModuleContext, Result, Services};
use loom_engine::utils::lock;
use loom_engine::{engine_debug, engine_info, engine_warn};
use crate::ports;

#[derive(Default)]
struct BarrierState {
    device: Option<DeviceId>,
    inputs: usize,
    outputs: Vec<String>,
}

/// Waits on its inputs, drains the device, then signals
///
/// Ports: `::device`, `::input` (Required names, any payload type) and
/// `::outputs` (names receiving the number of passes so far as `u64`).
/// A frame missing one of the inputs signals nothing.
pub struct GpuBarrier {
    name: String,
    state: Arc<Mutex<BarrierState>>,
    bus: Option<Bus>,
    services: Option<Services>,
    passes: u64,
}

impl GpuBarrier {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(BarrierState::default())),
            bus: None,
            services: None,
            passes: 0,
        }
    }

    /// Frames on which every input arrived
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Names currently gating the barrier
    pub fn input_count(&self) -> usize {
        lock(&self.state).inputs
    }

    fn drain(&self) {
        let Some(services) = &self.services else {
            return;
        };
        let Some(device) = lock(&self.state).device.and_then(|id| services.devices.get(id)) else {
            return;
        };
        if let Err(err) = device.wait_idle() {
            engine_warn!("loom::GpuBarrier", "[{}] wait_idle failed: {}", self.name, err);
        }
    }
}

impl Default for GpuBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for GpuBarrier {
    fn type_name(&self) -> &'static str {
        "GpuBarrier"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut BarrierState| &mut s.device);
        ports::names(bus, &self.state, ctx.port("outputs"), |s: &mut BarrierState| &mut s.outputs);

        let weak_bus = bus.downgrade();
        let weak_state = Arc::downgrade(&self.state);
        let module = self.name.clone();
        bus.enroll_indexed(ctx.port("input"), Requirement::Optional, move |_, value: &Value| {
            let Some(name) = value.as_str() else {
                engine_warn!("loom::GpuBarrier", "[{}] '::input' expects signal names, got {}", module, value);
                return;
            };
            let (Some(bus), Some(state)) = (weak_bus.upgrade(), weak_state.upgrade()) else {
                return;
            };
            engine_info!("loom::GpuBarrier", "[{}] waits on '{}'", module, name);
            bus.enroll_any(name, Requirement::Required, |_| {});
            lock(&state).inputs += 1;
        });

        self.bus = Some(bus.clone());
        self.services = Some(ctx.services().clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let Some(bus) = self.bus.clone() else {
            return Ok(());
        };
        if let WaitStatus::Pending { missing } = bus.wait() {
            engine_debug!("loom::GpuBarrier", "[{}] waiting for {:?}", self.name, missing);
            return Ok(());
        }
        if lock(&self.state).inputs == 0 {
            return Ok(());
        }

        self.drain();
        self.passes += 1;
        let outputs = lock(&self.state).outputs.clone();
        for output in &outputs {
            bus.emit_value(output, self.passes);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.drain();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "gpu_barrier_tests.rs"]
mod tests;
