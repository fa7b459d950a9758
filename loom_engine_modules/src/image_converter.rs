/// Image converter - uploads a host image and publishes the device image

use std::any::Any;
use std::sync::{Arc, Mutex};
use serde_json::Value;
use winit::dpi::PhysicalSize;
use loom_engine::bus::{Bus, Link, Requirement, WaitStatus};
use loom_engine::gpu::{
    BufferUsage, ChainDesc, Device, DeviceId, Image, ImageDesc, ImageFormat, SharedChain,
};
use loom_engine::loom::{Module, ModuleContext, Result, Services};
use loom_engine::resource::{DeviceMirror, DirtyFlags, GateStatus, ResourceGate};
use loom_engine::utils::lock;
use loom_engine::{engine_debug, engine_info, engine_warn};
use crate::ports;

/// Staging growth headroom in bytes
const STAGING_HEADROOM: usize = 10_000;

const INPUT_BYTES: usize = 0;
const INPUT_WIDTH: usize = 1;
const INPUT_HEIGHT: usize = 2;
const INPUT_CHANNELS: usize = 3;

#[derive(Default)]
struct ConverterState {
    device: Option<DeviceId>,
    bytes: Vec<u8>,
    extent: PhysicalSize<u32>,
    channels: u32,
    outputs: Vec<String>,
    dirty: DirtyFlags,
    /// Extent or channel count changed; the image must be recreated
    reshaped: bool,
}

impl ConverterState {
    #[allow(clippy::ptr_arg)]
    fn set_bytes(&mut self, bytes: &Vec<u8>) {
        self.bytes.clone_from(bytes);
        self.dirty.insert(DirtyFlags::PIXELS);
    }

    fn set_width(&mut self, width: &u32) {
        self.reshaped |= self.extent.width != *width;
        self.extent.width = *width;
    }

    fn set_height(&mut self, height: &u32) {
        self.reshaped |= self.extent.height != *height;
        self.extent.height = *height;
    }

    fn set_channels(&mut self, channels: &u32) {
        self.reshaped |= self.channels != *channels;
        self.channels = *channels;
    }
}

/// Expand interleaved 8-bit `channels` into the texel layout of `format`
fn convert(bytes: &[u8], channels: u32, format: ImageFormat) -> Vec<u8> {
    let channels = channels as usize;
    let texel = format.texel_size() as usize;
    if channels == texel {
        return bytes.to_vec();
    }
    let mut out = Vec::with_capacity(bytes.len() / channels.max(1) * texel);
    for pixel in bytes.chunks_exact(channels) {
        out.extend_from_slice(pixel);
        out.extend(std::iter::repeat(u8::MAX).take(texel.saturating_sub(channels)));
    }
    out
}

struct ConverterGpu {
    device: Arc<dyn Device>,
    chain: SharedChain,
    image: Arc<dyn Image>,
}

/// Host image to device image
///
/// `::inputs` lists four Required names by position: the pixel bytes
/// (`Vec<u8>`), then width, height and channel count (`u32` each). Once all
/// four arrived in a frame the bytes are converted, staged, copied into the
/// image in the same submission, and the image link is emitted on every
/// `::outputs` name. `::device` selects the device.
pub struct ImageConverter {
    name: String,
    state: Arc<Mutex<ConverterState>>,
    staging: DeviceMirror<u8>,
    bus: Option<Bus>,
    services: Option<Services>,
    gate: ResourceGate,
    gpu: Option<ConverterGpu>,
}

impl ImageConverter {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            state: Arc::new(Mutex::new(ConverterState::default())),
            staging: DeviceMirror::new("ImageConverter::staging", BufferUsage::Staging).with_headroom(STAGING_HEADROOM),
            bus: None,
            services: None,
            gate: ResourceGate::new("ImageConverter"),
            gpu: None,
        }
    }

    pub fn gate(&self) -> &ResourceGate {
        &self.gate
    }

    /// Bytes currently staged for upload
    pub fn staged(&self) -> &[u8] {
        self.staging.as_slice()
    }

    fn release(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            if let Err(err) = gpu.device.wait_idle() {
                engine_warn!("loom::ImageConverter", "[{}] wait_idle failed: {}", self.name, err);
            }
        }
    }

    /// Enroll each listed input with the payload type of its position
    fn subscribe_inputs(&self, bus: &Bus, port: String) {
        let weak_bus = bus.downgrade();
        let weak_state = Arc::downgrade(&self.state);
        let source = port.clone();
        bus.enroll_indexed(port, Requirement::Optional, move |position, value: &Value| {
            let Some(name) = value.as_str() else {
                engine_warn!("loom::ImageConverter", "'{}' expects signal names, got {}", source, value);
                return;
            };
            let (Some(bus), Some(state)) = (weak_bus.upgrade(), weak_state.upgrade()) else {
                return;
            };
            match position {
                INPUT_BYTES => bus.enroll_to(&state, name, Requirement::Required, ConverterState::set_bytes),
                INPUT_WIDTH => bus.enroll_to(&state, name, Requirement::Required, ConverterState::set_width),
                INPUT_HEIGHT => bus.enroll_to(&state, name, Requirement::Required, ConverterState::set_height),
                INPUT_CHANNELS => bus.enroll_to(&state, name, Requirement::Required, ConverterState::set_channels),
                _ => {
                    engine_warn!("loom::ImageConverter", "'{}' has no input {} ('{}')", source, position, name);
                    return;
                }
            };
        });
    }
}

impl Default for ImageConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ImageConverter {
    fn type_name(&self) -> &'static str {
        "ImageConverter"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        self.gate = ResourceGate::new(format!("ImageConverter[{}]", self.name));
        self.staging = DeviceMirror::new(format!("{}::staging", self.name), BufferUsage::Staging)
            .with_headroom(STAGING_HEADROOM);
        let bus = ctx.bus();

        ports::device(bus, &self.state, ctx.port("device"), |s: &mut ConverterState| &mut s.device);
        ports::names(bus, &self.state, ctx.port("outputs"), |s: &mut ConverterState| &mut s.outputs);
        self.subscribe_inputs(bus, ctx.port("inputs"));

        self.bus = Some(bus.clone());
        self.services = Some(ctx.services().clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let (Some(bus), Some(services)) = (self.bus.clone(), self.services.clone()) else {
            return Ok(());
        };
        if let WaitStatus::Pending { missing } = bus.wait() {
            engine_debug!("loom::ImageConverter", "[{}] waiting for {:?}", self.name, missing);
            return Ok(());
        }

        let (device_id, extent, channels, reshaped, pixels) = {
            let mut state = lock(&self.state);
            let reshaped = std::mem::take(&mut state.reshaped);
            let pixels = if state.dirty.take(DirtyFlags::PIXELS) {
                Some(std::mem::take(&mut state.bytes))
            } else {
                None
            };
            (state.device, state.extent, state.channels, reshaped, pixels)
        };
        if reshaped && self.gpu.is_some() {
            engine_info!("loom::ImageConverter", "[{}] reshaped to {}x{}x{}", self.name, extent.width, extent.height, channels);
            self.gate.invalidate();
            self.release();
        }

        let format = ImageFormat::from_channels(channels);
        let texels = extent.width as usize * extent.height as usize;
        let complete = pixels
            .as_ref()
            .map_or(!self.staging.is_empty(), |bytes| bytes.len() >= texels * channels as usize);
        if let Some(pixels) = &pixels {
            if !complete {
                engine_warn!(
                    "loom::ImageConverter",
                    "[{}] {} byte(s) do not cover {}x{}x{}",
                    self.name, pixels.len(), extent.width, extent.height, channels
                );
            }
        }

        let device = device_id.and_then(|id| services.devices.get(id));
        let checks = [
            ("device", device.is_some()),
            ("extent", texels > 0),
            ("channels", format.is_some()),
            ("pixels", complete),
        ];
        let name = self.name.clone();
        let slot = &mut self.gpu;
        let status = self.gate.poll(&checks, |_| {
            let (Some(device), Some(format)) = (device.clone(), format) else {
                return Ok(());
            };
            let chain = device.create_chain(ChainDesc::transfer(format!("{}::upload", name)))?;
            let image = device.create_image(ImageDesc { name: format!("{}::image", name), extent, format })?;
            *slot = Some(ConverterGpu { device, chain, image });
            Ok(())
        })?;

        let Some(gpu) = &self.gpu else {
            return Ok(());
        };
        if let (Some(pixels), Some(format)) = (pixels.filter(|_| complete), format) {
            let used = texels * channels as usize;
            self.staging.replace(&convert(&pixels[..used], channels, format));
        } else if matches!(status, GateStatus::Constructed { .. }) {
            self.staging.mark_dirty();
        }
        {
            let image = gpu.image.clone();
            let mut chain = lock(&gpu.chain);
            self.staging.sync_then(gpu.device.as_ref(), &mut *chain, |chain, staging| {
                chain.copy_to_image(staging, &image)
            })?;
        }

        let outputs = lock(&self.state).outputs.clone();
        let link = Link::new(&gpu.image);
        for output in &outputs {
            bus.emit_value(output, link.clone());
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
#[path = "image_converter_tests.rs"]
mod tests;
