/// Headless device - records every call instead of talking to a GPU
///
/// Used by tests and dry runs. Chains validate their state transitions the
/// way a real backend would reject them, buffers keep their bytes so uploads
/// can be inspected, and surface loss can be simulated.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use rustc_hash::FxHashMap;
use winit::dpi::PhysicalSize;
use crate::engine_bail;
use crate::engine_error;
use crate::error::{Error, Result};
use crate::gpu::{
    Buffer, BufferDesc, BufferUsage, Chain, ChainDesc, ChainState, Device, Image, ImageDesc,
    ImageFormat, Pipeline, PipelineDesc, PipelineKind, PresentStatus, RenderPass, RenderPassDesc,
    SharedChain, SharedRenderPass, SubpassDesc,
};
use crate::utils::lock;

// ============================================================================
// Configuration and statistics
// ============================================================================

/// Headless device configuration
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    pub name: String,
    /// Number of in-flight slots per chain
    pub ring_size: usize,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            name: "headless".to_string(),
            ring_size: 3,
        }
    }
}

#[derive(Default)]
struct Counters {
    chains: AtomicUsize,
    buffers: AtomicUsize,
    images: AtomicUsize,
    pipelines: AtomicUsize,
    passes: AtomicUsize,
    copies: AtomicUsize,
    image_copies: AtomicUsize,
    submits: AtomicUsize,
    advances: AtomicUsize,
    presents: AtomicUsize,
    idle_waits: AtomicUsize,
}

/// Snapshot of everything the device has been asked to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub chains_created: usize,
    pub buffers_created: usize,
    pub images_created: usize,
    pub pipelines_created: usize,
    pub passes_created: usize,
    pub copies: usize,
    pub image_copies: usize,
    pub submits: usize,
    pub advances: usize,
    pub presents: usize,
    pub idle_waits: usize,
}

/// One recorded chain operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin { subpass: Option<u32> },
    End,
    Bind(String),
    Push(usize),
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    DrawInstanced { vertex_count: u32, instance_count: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    Copy { buffer: String, bytes: usize },
    CopyToImage { buffer: String, image: String, bytes: usize },
    Combine { child: String, commands: Vec<Command> },
    Submit,
    Synchronize,
    Advance,
}

fn state_error(chain: &str, operation: &str, state: ChainState) -> Error {
    let message = format!("{} on chain '{}' in state {:?}", operation, chain, state);
    engine_error!("loom::Headless", "{}", message);
    Error::InvalidState(message)
}

// ============================================================================
// Headless Chain
// ============================================================================

pub struct HeadlessChain {
    name: String,
    subpass: Option<u32>,
    state: ChainState,
    ring_index: usize,
    ring_size: usize,
    recording: Vec<Command>,
    recorded: Vec<Command>,
    log: Vec<Command>,
    counters: Arc<Counters>,
}

impl HeadlessChain {
    fn new(name: String, subpass: Option<u32>, ring_size: usize, counters: Arc<Counters>) -> Self {
        Self {
            name,
            subpass,
            state: ChainState::Uninitialized,
            ring_index: 0,
            ring_size: ring_size.max(1),
            recording: Vec::new(),
            recorded: Vec::new(),
            log: Vec::new(),
            counters,
        }
    }

    /// Commands of the last completed recording
    pub fn recorded(&self) -> &[Command] {
        &self.recorded
    }

    /// Every call made on this chain, in order
    pub fn log(&self) -> &[Command] {
        &self.log
    }

    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.log.iter().filter(|c| predicate(c)).count()
    }

    pub fn submit_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Submit))
    }

    pub fn advance_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Advance))
    }

    pub fn begin_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Begin { .. }))
    }

    pub fn copy_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Copy { .. }))
    }

    pub fn dispatch_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Dispatch { .. }))
    }

    fn step_ring(&mut self) {
        self.ring_index = (self.ring_index + 1) % self.ring_size;
    }

    /// Transfers may be recorded or issued directly on an idle chain
    fn transfer(&mut self, command: Command) {
        if self.state == ChainState::Recording {
            self.recording.push(command.clone());
        } else {
            self.state = ChainState::Idle;
        }
        self.log.push(command);
    }

    fn record(&mut self, operation: &str, command: Command) -> Result<()> {
        if self.state != ChainState::Recording {
            return Err(state_error(&self.name, operation, self.state));
        }
        self.recording.push(command.clone());
        self.log.push(command);
        Ok(())
    }
}

impl Chain for HeadlessChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ChainState {
        self.state
    }

    fn ring_index(&self) -> usize {
        self.ring_index
    }

    fn ring_size(&self) -> usize {
        self.ring_size
    }

    fn begin(&mut self) -> Result<()> {
        if self.state == ChainState::Recording {
            return Err(state_error(&self.name, "begin", self.state));
        }
        self.recording.clear();
        self.state = ChainState::Recording;
        let command = Command::Begin { subpass: self.subpass };
        self.recording.push(command.clone());
        self.log.push(command);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.record("end", Command::End)?;
        self.recorded = std::mem::take(&mut self.recording);
        self.state = ChainState::Idle;
        Ok(())
    }

    fn bind(&mut self, pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.record("bind", Command::Bind(pipeline.name().to_string()))
    }

    fn push(&mut self, constants: &[u8]) -> Result<()> {
        self.record("push", Command::Push(constants.len()))
    }

    fn draw(&mut self, vertex_count: u32) -> Result<()> {
        self.record("draw", Command::Draw { vertex_count })
    }

    fn draw_indexed(&mut self, _vertices: &Arc<dyn Buffer>, _indices: &Arc<dyn Buffer>, index_count: u32) -> Result<()> {
        self.record("draw_indexed", Command::DrawIndexed { index_count })
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32) -> Result<()> {
        self.record("draw_instanced", Command::DrawInstanced { vertex_count, instance_count })
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.record("dispatch", Command::Dispatch { x, y, z })
    }

    fn copy(&mut self, data: &[u8], dst: &Arc<dyn Buffer>, offset: u64) -> Result<()> {
        dst.update(offset, data)?;
        self.transfer(Command::Copy { buffer: dst.name().to_string(), bytes: data.len() });
        self.counters.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn copy_to_image(&mut self, src: &Arc<dyn Buffer>, dst: &Arc<dyn Image>) -> Result<()> {
        let (Some(buffer), Some(image)) = (
            src.as_any().downcast_ref::<HeadlessBuffer>(),
            dst.as_any().downcast_ref::<HeadlessImage>(),
        ) else {
            engine_bail!("loom::Headless", "copy_to_image: '{}' or '{}' belongs to another backend", src.name(), dst.name());
        };
        let bytes = image.byte_size() as usize;
        let contents = buffer.contents();
        if contents.len() < bytes {
            engine_bail!(
                "loom::Headless",
                "copy_to_image: buffer '{}' holds {} bytes, image '{}' needs {}",
                buffer.name, contents.len(), image.name, bytes
            );
        }
        image.write(&contents[..bytes]);
        self.transfer(Command::CopyToImage { buffer: buffer.name.clone(), image: image.name.clone(), bytes });
        self.counters.image_copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn submit(&mut self) -> Result<()> {
        match self.state {
            ChainState::Idle | ChainState::Submitted => {}
            state => return Err(state_error(&self.name, "submit", state)),
        }
        self.state = ChainState::Submitted;
        self.log.push(Command::Submit);
        self.step_ring();
        self.counters.submits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn synchronize(&mut self) -> Result<()> {
        match self.state {
            ChainState::Recording => return Err(state_error(&self.name, "synchronize", self.state)),
            ChainState::Submitted => self.state = ChainState::Idle,
            _ => {}
        }
        self.log.push(Command::Synchronize);
        Ok(())
    }

    fn advance(&mut self) -> Result<()> {
        if self.state == ChainState::Recording {
            return Err(state_error(&self.name, "advance", self.state));
        }
        self.log.push(Command::Advance);
        self.step_ring();
        self.counters.advances.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn combine(&mut self, child: &dyn Chain) -> Result<()> {
        let Some(child) = child.as_any().downcast_ref::<HeadlessChain>() else {
            engine_bail!("loom::Headless", "combine: chain '{}' belongs to another backend", child.name());
        };
        if child.state == ChainState::Recording {
            return Err(state_error(&child.name, "combine (child)", child.state));
        }
        self.record(
            "combine",
            Command::Combine { child: child.name.clone(), commands: child.recorded.clone() },
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Headless Buffer
// ============================================================================

pub struct HeadlessBuffer {
    name: String,
    usage: BufferUsage,
    data: Mutex<Vec<u8>>,
    writes: AtomicUsize,
}

impl HeadlessBuffer {
    /// Copy of the buffer contents
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.data).clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Buffer for HeadlessBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        lock(&self.data).len() as u64
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = lock(&self.data);
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            engine_bail!(
                "loom::Headless",
                "update: {} bytes at offset {} overflow buffer '{}' of {} bytes",
                data.len(), offset, self.name, bytes.len()
            );
        }
        bytes[start..end].copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Headless Image
// ============================================================================

pub struct HeadlessImage {
    name: String,
    extent: PhysicalSize<u32>,
    format: ImageFormat,
    /// Empty until the first copy
    texels: Mutex<Vec<u8>>,
    writes: AtomicUsize,
}

impl HeadlessImage {
    fn new(name: String, extent: PhysicalSize<u32>, format: ImageFormat) -> Self {
        Self { name, extent, format, texels: Mutex::new(Vec::new()), writes: AtomicUsize::new(0) }
    }

    fn write(&self, bytes: &[u8]) {
        let mut texels = lock(&self.texels);
        texels.clear();
        texels.extend_from_slice(bytes);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the texels written so far
    pub fn contents(&self) -> Vec<u8> {
        lock(&self.texels).clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl Image for HeadlessImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn extent(&self) -> PhysicalSize<u32> {
        self.extent
    }

    fn format(&self) -> ImageFormat {
        self.format
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Headless Pipeline
// ============================================================================

pub struct HeadlessPipeline {
    name: String,
    kind: PipelineKind,
    shader_len: usize,
    bindings: Mutex<FxHashMap<String, usize>>,
    bind_calls: AtomicUsize,
}

impl HeadlessPipeline {
    /// Number of items bound under `key`
    pub fn bound_count(&self, key: &str) -> Option<usize> {
        lock(&self.bindings).get(key).copied()
    }

    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::Relaxed)
    }

    pub fn shader_len(&self) -> usize {
        self.shader_len
    }
}

impl Pipeline for HeadlessPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PipelineKind {
        self.kind
    }

    fn bind_buffer(&self, key: &str, _buffer: &Arc<dyn Buffer>) -> Result<()> {
        lock(&self.bindings).insert(key.to_string(), 1);
        self.bind_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn bind_images(&self, key: &str, images: &[Arc<dyn Image>]) -> Result<()> {
        lock(&self.bindings).insert(key.to_string(), images.len());
        self.bind_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_bound(&self, key: &str) -> bool {
        lock(&self.bindings).contains_key(key)
    }
}

// ============================================================================
// Headless Render Pass
// ============================================================================

pub struct HeadlessRenderPass {
    name: String,
    extent: PhysicalSize<u32>,
    subpasses: Vec<SubpassDesc>,
    surface_lost: Arc<AtomicBool>,
    output: Arc<dyn Image>,
    presented: usize,
    counters: Arc<Counters>,
}

impl HeadlessRenderPass {
    pub fn subpasses(&self) -> &[SubpassDesc] {
        &self.subpasses
    }

    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl RenderPass for HeadlessRenderPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn extent(&self) -> PhysicalSize<u32> {
        self.extent
    }

    fn subpass_count(&self) -> u32 {
        self.subpasses.len() as u32
    }

    fn present(&mut self, chain: &mut dyn Chain) -> Result<PresentStatus> {
        if self.surface_lost.swap(false, Ordering::AcqRel) {
            return Ok(PresentStatus::SurfaceLost);
        }
        if chain.state() != ChainState::Submitted {
            return Err(state_error(chain.name(), "present", chain.state()));
        }
        self.presented += 1;
        self.counters.presents.fetch_add(1, Ordering::Relaxed);
        Ok(PresentStatus::Presented)
    }

    fn output(&self) -> Option<Arc<dyn Image>> {
        Some(self.output.clone())
    }
}

// ============================================================================
// Headless Device
// ============================================================================

/// Device that records instead of rendering
pub struct HeadlessDevice {
    config: HeadlessConfig,
    counters: Arc<Counters>,
    surface_lost: Arc<AtomicBool>,
    chains: Mutex<Vec<Weak<Mutex<HeadlessChain>>>>,
    buffers: Mutex<FxHashMap<String, Weak<HeadlessBuffer>>>,
    images: Mutex<FxHashMap<String, Weak<HeadlessImage>>>,
    pipelines: Mutex<FxHashMap<String, Weak<HeadlessPipeline>>>,
}

impl HeadlessDevice {
    pub fn new(config: HeadlessConfig) -> Self {
        Self {
            config,
            counters: Arc::new(Counters::default()),
            surface_lost: Arc::new(AtomicBool::new(false)),
            chains: Mutex::new(Vec::new()),
            buffers: Mutex::new(FxHashMap::default()),
            images: Mutex::new(FxHashMap::default()),
            pipelines: Mutex::new(FxHashMap::default()),
        }
    }

    /// The next `present` on any pass of this device reports surface loss
    pub fn lose_surface(&self) {
        self.surface_lost.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> HeadlessStats {
        let c = &self.counters;
        HeadlessStats {
            chains_created: c.chains.load(Ordering::Relaxed),
            buffers_created: c.buffers.load(Ordering::Relaxed),
            images_created: c.images.load(Ordering::Relaxed),
            pipelines_created: c.pipelines.load(Ordering::Relaxed),
            passes_created: c.passes.load(Ordering::Relaxed),
            copies: c.copies.load(Ordering::Relaxed),
            image_copies: c.image_copies.load(Ordering::Relaxed),
            submits: c.submits.load(Ordering::Relaxed),
            advances: c.advances.load(Ordering::Relaxed),
            presents: c.presents.load(Ordering::Relaxed),
            idle_waits: c.idle_waits.load(Ordering::Relaxed),
        }
    }

    /// Most recently created live chain with this name
    pub fn chain(&self, name: &str) -> Option<Arc<Mutex<HeadlessChain>>> {
        lock(&self.chains)
            .iter()
            .rev()
            .filter_map(Weak::upgrade)
            .find(|chain| lock(chain).name == name)
    }

    /// Most recently created live buffer with this name
    pub fn buffer(&self, name: &str) -> Option<Arc<HeadlessBuffer>> {
        lock(&self.buffers).get(name).and_then(Weak::upgrade)
    }

    /// Most recently created live image with this name
    pub fn image(&self, name: &str) -> Option<Arc<HeadlessImage>> {
        lock(&self.images).get(name).and_then(Weak::upgrade)
    }

    /// Most recently created live pipeline with this name
    pub fn pipeline(&self, name: &str) -> Option<Arc<HeadlessPipeline>> {
        lock(&self.pipelines).get(name).and_then(Weak::upgrade)
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessConfig::default())
    }
}

impl Device for HeadlessDevice {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn create_chain(&self, desc: ChainDesc) -> Result<SharedChain> {
        let subpass = desc.pass.as_ref().map(|(_, subpass)| *subpass);
        let chain = Arc::new(Mutex::new(HeadlessChain::new(
            desc.name,
            subpass,
            self.config.ring_size,
            self.counters.clone(),
        )));
        let mut chains = lock(&self.chains);
        chains.retain(|weak| weak.strong_count() > 0);
        chains.push(Arc::downgrade(&chain));
        self.counters.chains.fetch_add(1, Ordering::Relaxed);
        Ok(chain)
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        if desc.size == 0 {
            engine_bail!("loom::Headless", "create_buffer: '{}' has size 0", desc.name);
        }
        let buffer = Arc::new(HeadlessBuffer {
            name: desc.name.clone(),
            usage: desc.usage,
            data: Mutex::new(vec![0; desc.size as usize]),
            writes: AtomicUsize::new(0),
        });
        lock(&self.buffers).insert(desc.name, Arc::downgrade(&buffer));
        self.counters.buffers.fetch_add(1, Ordering::Relaxed);
        Ok(buffer)
    }

    fn create_image(&self, desc: ImageDesc) -> Result<Arc<dyn Image>> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            engine_bail!("loom::Headless", "create_image: '{}' has an empty extent", desc.name);
        }
        let image = Arc::new(HeadlessImage::new(desc.name.clone(), desc.extent, desc.format));
        lock(&self.images).insert(desc.name, Arc::downgrade(&image));
        self.counters.images.fetch_add(1, Ordering::Relaxed);
        Ok(image)
    }

    fn create_pipeline(&self, desc: PipelineDesc) -> Result<Arc<dyn Pipeline>> {
        if desc.shader.is_empty() {
            engine_bail!("loom::Headless", "create_pipeline: '{}' has no shader bytes", desc.name);
        }
        if desc.kind == PipelineKind::Graphics && desc.pass.is_none() {
            engine_bail!("loom::Headless", "create_pipeline: graphics pipeline '{}' needs a render pass", desc.name);
        }
        let pipeline = Arc::new(HeadlessPipeline {
            name: desc.name.clone(),
            kind: desc.kind,
            shader_len: desc.shader.len(),
            bindings: Mutex::new(FxHashMap::default()),
            bind_calls: AtomicUsize::new(0),
        });
        lock(&self.pipelines).insert(desc.name, Arc::downgrade(&pipeline));
        self.counters.pipelines.fetch_add(1, Ordering::Relaxed);
        Ok(pipeline)
    }

    fn create_render_pass(&self, desc: RenderPassDesc) -> Result<SharedRenderPass> {
        if desc.subpasses.is_empty() {
            engine_bail!("loom::Headless", "create_render_pass: '{}' has no subpasses", desc.name);
        }
        if desc.extent.width == 0 || desc.extent.height == 0 {
            engine_bail!("loom::Headless", "create_render_pass: '{}' has an empty extent", desc.name);
        }
        let format = desc
            .subpasses
            .last()
            .and_then(|subpass| subpass.attachments.first())
            .map(|attachment| attachment.format)
            .unwrap_or_default();
        let output: Arc<dyn Image> = Arc::new(HeadlessImage::new(format!("{}::output", desc.name), desc.extent, format));
        self.counters.passes.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Mutex::new(HeadlessRenderPass {
            name: desc.name,
            extent: desc.extent,
            subpasses: desc.subpasses,
            surface_lost: self.surface_lost.clone(),
            output,
            presented: 0,
            counters: self.counters.clone(),
        })))
    }

    fn wait_idle(&self) -> Result<()> {
        self.counters.idle_waits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
#[path = "headless_tests.rs"]
mod tests;
