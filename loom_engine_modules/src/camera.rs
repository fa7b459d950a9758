/// Camera - publishes a view matrix every frame

use std::any::Any;
use std::sync::{Arc, Mutex};
use glam::{Mat4, Vec3, Vec4};
use loom_engine::bus::{Bus, Requirement};
use loom_engine::loom::{Module, ModuleContext, Result};
use loom_engine::resource::DirtyFlags;
use loom_engine::utils::lock;
use crate::ports;

struct CameraState {
    position: Vec3,
    /// Viewing direction, kept when the camera moves
    direction: Option<Vec3>,
    /// Post-multiplied onto the look-at or translation matrix
    transform: Mat4,
    view: Mat4,
    outputs: Vec<String>,
    dirty: DirtyFlags,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: None,
            transform: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            outputs: Vec::new(),
            dirty: DirtyFlags::CAMERA,
        }
    }
}

impl CameraState {
    fn view_matrix(&self) -> Mat4 {
        let eye = self.position;
        let base = match self.direction {
            Some(direction) if direction.length_squared() > f32::EPSILON => {
                let forward = direction.normalize();
                let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 { Vec3::Z } else { Vec3::Y };
                Mat4::look_at_rh(eye, eye + forward, up)
            }
            _ => Mat4::from_translation(-eye),
        };
        base * self.transform
    }
}

/// View-matrix source
///
/// Ports: `::position`, `::translate`, `::lookat` (all `Vec4`, `w` ignored),
/// `::transform` (`Mat4`) and `::outputs`, the names the view is emitted on.
///
/// `::lookat` is a viewing direction relative to the position, not a target
/// point: translating the camera keeps it looking the same way.
pub struct Camera {
    state: Arc<Mutex<CameraState>>,
    bus: Option<Bus>,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CameraState::default())),
            bus: None,
        }
    }

    /// View matrix of the last executed frame
    pub fn view(&self) -> Mat4 {
        lock(&self.state).view
    }

    pub fn position(&self) -> Vec3 {
        lock(&self.state).position
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Camera {
    fn type_name(&self) -> &'static str {
        "Camera"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        let bus = ctx.bus();
        bus.enroll_to(&self.state, ctx.port("position"), Requirement::Optional, |s: &mut CameraState, v: &Vec4| {
            s.position = v.truncate();
            s.dirty.insert(DirtyFlags::CAMERA);
        });
        bus.enroll_to(&self.state, ctx.port("translate"), Requirement::Optional, |s: &mut CameraState, v: &Vec4| {
            s.position += v.truncate();
            s.dirty.insert(DirtyFlags::CAMERA);
        });
        bus.enroll_to(&self.state, ctx.port("lookat"), Requirement::Optional, |s: &mut CameraState, v: &Vec4| {
            s.direction = Some(v.truncate());
            s.dirty.insert(DirtyFlags::CAMERA);
        });
        bus.enroll_to(&self.state, ctx.port("transform"), Requirement::Optional, |s: &mut CameraState, m: &Mat4| {
            s.transform *= *m;
            s.dirty.insert(DirtyFlags::CAMERA);
        });
        ports::names(bus, &self.state, ctx.port("outputs"), |s: &mut CameraState| &mut s.outputs);
        self.bus = Some(bus.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let (view, outputs) = {
            let mut state = lock(&self.state);
            if state.dirty.take(DirtyFlags::CAMERA) {
                state.view = state.view_matrix();
            }
            (state.view, state.outputs.clone())
        };
        if let Some(bus) = &self.bus {
            for name in &outputs {
                bus.emit_value(name, view);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
