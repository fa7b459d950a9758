/// Window - terminal sink of a graph

use std::any::Any;
use std::sync::{Arc, Mutex};
use serde_json::Value;
use winit::dpi::PhysicalSize;
use loom_engine::bus::{Bus, Requirement, WaitStatus};
use loom_engine::config::set_indexed;
use loom_engine::gpu::ImageLink;
use loom_engine::loom::{Module, ModuleContext, Result, EXIT_SIGNAL};
use loom_engine::utils::lock;
use loom_engine::{engine_debug, engine_info};
use crate::ports;

const DEFAULT_EXTENT: PhysicalSize<u32> = PhysicalSize::new(1280, 720);

struct WindowState {
    extent: PhysicalSize<u32>,
    title: String,
    quit_on_close: bool,
    close_requested: bool,
    frames: u64,
    images: Vec<Option<ImageLink>>,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            extent: DEFAULT_EXTENT,
            title: String::from("loom"),
            quit_on_close: false,
            close_requested: false,
            frames: 0,
            images: Vec::new(),
        }
    }
}

/// Receives finished images and owns the exit decision
///
/// Ports: `::inputs` (Required names carrying an [`ImageLink`]), `::width`,
/// `::height`, `::title`, `::quit_on_close` and `::close` (name carrying a
/// `bool`). Every frame all inputs arrived, the shown frame count is published
/// on `::presented`.
pub struct Window {
    name: String,
    state: Arc<Mutex<WindowState>>,
    bus: Option<Bus>,
}

impl Window {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(WindowState::default())),
            bus: None,
        }
    }

    pub fn extent(&self) -> PhysicalSize<u32> {
        lock(&self.state).extent
    }

    pub fn title(&self) -> String {
        lock(&self.state).title.clone()
    }

    /// Frames on which every input was present
    pub fn frames(&self) -> u64 {
        lock(&self.state).frames
    }

    /// Ask the window to close, as the windowing system would
    pub fn request_close(&self) {
        lock(&self.state).close_requested = true;
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Window {
    fn type_name(&self) -> &'static str {
        "Window"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        let bus = ctx.bus();

        ports::follow_indexed(bus, &self.state, ctx.port("inputs"), Requirement::Required, |s: &mut WindowState, slot, image: &ImageLink| {
            set_indexed(&mut s.images, slot, Some(image.clone()));
        });
        ports::dimension(bus, &self.state, ctx.port("width"), |s: &mut WindowState, w| s.extent.width = w);
        ports::dimension(bus, &self.state, ctx.port("height"), |s: &mut WindowState, h| s.extent.height = h);
        bus.enroll_to(&self.state, ctx.port("title"), Requirement::Optional, |s: &mut WindowState, v: &Value| {
            if let Some(title) = v.as_str() {
                s.title = title.to_string();
            }
        });
        bus.enroll_to(&self.state, ctx.port("quit_on_close"), Requirement::Optional, |s: &mut WindowState, v: &Value| {
            s.quit_on_close = v.as_bool().unwrap_or(false);
        });
        ports::follow(bus, &self.state, ctx.port("close"), Requirement::Optional, |s: &mut WindowState, close: &bool| {
            s.close_requested |= *close;
        });
        bus.publish_from(&self.state, ctx.port("presented"), |s: &WindowState| s.frames);

        self.bus = Some(bus.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let Some(bus) = self.bus.clone() else {
            return Ok(());
        };

        // A close is honored even while inputs are still missing.
        let quit = {
            let mut state = lock(&self.state);
            std::mem::take(&mut state.close_requested) && state.quit_on_close
        };
        if quit {
            engine_info!("loom::Window", "[{}] close requested; exiting", self.name);
            bus.emit_value(EXIT_SIGNAL, true);
            return Ok(());
        }

        if let WaitStatus::Pending { missing } = bus.wait() {
            engine_debug!("loom::Window", "[{}] waiting for {:?}", self.name, missing);
            return Ok(());
        }
        lock(&self.state).frames += 1;
        bus.emit();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
