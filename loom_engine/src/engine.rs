/// Loom Engine - owns a module graph and drives it frame by frame
///
/// One engine holds one signal router, the shared services injected into its
/// modules, and the modules themselves in their resolved execution order.
/// Logging is process-wide and configured through the associated functions.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::SystemTime;
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use crate::bus::{Bus, ChannelId, Requirement, SignalRouter};
use crate::config::{GraphConfig, ModuleConfig};
use crate::error::{Error, Result};
use crate::gpu::{Device, DeviceId};
use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
use crate::module::{ExecutionGraph, Module, ModuleContext, ModuleHost, ModuleRegistry, ModuleState, Services};

/// Signal any module may emit (`true`) to ask the host loop to stop
pub const EXIT_SIGNAL: &str = "loom::exit";

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity are discarded
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(0);

new_key_type! {
    /// Generational key of a module instance
    pub struct ModuleKey;
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Pending frames before a module's missing Required inputs are reported
    pub stall_warning_frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stall_warning_frames: crate::bus::STALL_WARNING_FRAMES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Running,
    Stopped,
}

struct ModuleSlot {
    host: ModuleHost,
    config: ModuleConfig,
}

// ===== PUBLIC API =====

/// Module graph runner
///
/// # Example
///
/// ```no_run
/// use loom_engine::loom::{Engine, EngineConfig, GraphConfig, ModuleRegistry};
///
/// let registry = ModuleRegistry::new();
/// let graph = GraphConfig::from_path("graph.json")?;
/// let mut engine = Engine::new(EngineConfig::default());
/// engine.load(&graph, &registry)?;
/// engine.start()?;
/// while !engine.exit_requested() {
///     engine.tick()?;
/// }
/// engine.shutdown();
/// # Ok::<(), loom_engine::loom::Error>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    router: SignalRouter,
    services: Services,
    channel: ChannelId,
    bus: Option<Bus>,
    modules: SlotMap<ModuleKey, ModuleSlot>,
    names: FxHashMap<String, ModuleKey>,
    order: Vec<ModuleKey>,
    phase: Phase,
    frame: u64,
    exit: Arc<AtomicBool>,
}

impl Engine {
    /// Helper to log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        crate::engine_error!("loom::Engine", "{}", error);
        error
    }

    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            router: SignalRouter::new(),
            services: Services::default(),
            channel: ChannelId::default(),
            bus: None,
            modules: SlotMap::with_key(),
            names: FxHashMap::default(),
            order: Vec::new(),
            phase: Phase::Loading,
            frame: 0,
            exit: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn router(&self) -> &SignalRouter {
        &self.router
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Frames executed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Make a device available to modules under `id`
    pub fn register_device(&self, id: DeviceId, device: Arc<dyn Device>) {
        crate::engine_info!("loom::Engine", "Registered device {:?} '{}'", id, device.name());
        self.services.devices.insert(id, device);
    }

    // ===== GRAPH LOADING =====

    /// Instantiate every module of `graph` from `registry`
    ///
    /// # Errors
    ///
    /// Configuration errors, unknown module types and duplicate names. A graph
    /// that fails validation adds nothing; a failing factory lookup leaves the
    /// earlier modules in place.
    pub fn load(&mut self, graph: &GraphConfig, registry: &ModuleRegistry) -> Result<()> {
        graph.validate().map_err(Self::log_and_return_error)?;
        self.channel = graph.channel;
        for config in &graph.modules {
            let module = registry.make(&config.type_name).map_err(Self::log_and_return_error)?;
            self.add_module(config.clone(), module)?;
        }
        crate::engine_info!(
            "loom::Engine",
            "Loaded {} module(s) on channel {}",
            graph.modules.len(),
            self.channel.0
        );
        Ok(())
    }

    /// Add one module instance before `start()`
    pub fn add_module(&mut self, config: ModuleConfig, module: Box<dyn Module>) -> Result<ModuleKey> {
        if self.phase != Phase::Loading {
            return Err(Self::log_and_return_error(Error::InvalidState(format!(
                "cannot add module '{}' after start",
                config.name
            ))));
        }
        if self.names.contains_key(&config.name) {
            return Err(Self::log_and_return_error(Error::DuplicateModule(config.name)));
        }
        let name = config.name.clone();
        let key = self.modules.insert(ModuleSlot {
            host: ModuleHost::new(name.clone(), module),
            config,
        });
        self.names.insert(name, key);
        Ok(key)
    }

    fn resolve_order(&self) -> Result<Vec<ModuleKey>> {
        let mut graph = ExecutionGraph::new();
        // Modules are never removed before start, so slot order is declaration order.
        for slot in self.modules.values() {
            graph.add_node(&slot.config.name);
        }
        for slot in self.modules.values() {
            for dependency in &slot.config.after {
                graph.add_dependency(&slot.config.name, dependency)?;
            }
        }
        graph
            .resolve()?
            .into_iter()
            .map(|name| {
                self.names
                    .get(&name)
                    .copied()
                    .ok_or_else(|| Error::ConfigError(format!("module '{}' vanished", name)))
            })
            .collect()
    }

    // ===== LIFECYCLE =====

    /// Subscribe every module, deliver configuration, then initialize
    pub fn start(&mut self) -> Result<()> {
        if self.phase != Phase::Loading {
            return Err(Self::log_and_return_error(Error::InvalidState("engine already started".to_string())));
        }
        self.order = self.resolve_order().map_err(Self::log_and_return_error)?;

        let bus = self.router.bus(self.channel);
        let exit = self.exit.clone();
        bus.enroll(EXIT_SIGNAL, Requirement::Optional, move |flag: &bool| {
            if *flag {
                exit.store(true, Ordering::Release);
            }
        });

        for key in &self.order {
            let slot = &mut self.modules[*key];
            let module_bus = self.router.bus(self.channel);
            module_bus.set_stall_threshold(self.config.stall_warning_frames);
            let ctx = ModuleContext::new(slot.config.name.clone(), module_bus, self.services.clone());
            slot.host.subscribe(&ctx).map_err(Self::log_and_return_error)?;
        }

        let mut delivered = 0;
        for key in &self.order {
            delivered += self.modules[*key].config.deliver(&bus);
        }
        crate::engine_debug!("loom::Engine", "Delivered {} configuration value(s)", delivered);

        for key in &self.order {
            self.modules[*key].host.initialize()?;
        }

        self.bus = Some(bus);
        self.phase = Phase::Running;
        crate::engine_info!("loom::Engine", "Started; execution order {:?}", self.execution_order());
        Ok(())
    }

    /// Execute every module once, in order
    ///
    /// A module error is logged and does not stop the frame. Returns the
    /// number of frames executed so far.
    pub fn tick(&mut self) -> Result<u64> {
        if self.phase != Phase::Running {
            return Err(Self::log_and_return_error(Error::InvalidState("tick before start or after shutdown".to_string())));
        }
        for key in &self.order {
            let host = &mut self.modules[*key].host;
            if let Err(err) = host.execute() {
                crate::engine_error!("loom::Engine", "Module '{}' failed in frame {}: {}", host.name(), self.frame, err);
            }
        }
        self.frame += 1;
        Ok(self.frame)
    }

    /// Tick up to `frames` times, stopping early on an exit request
    pub fn run_frames(&mut self, frames: u64) -> Result<u64> {
        for _ in 0..frames {
            if self.exit_requested() {
                break;
            }
            self.tick()?;
        }
        Ok(self.frame)
    }

    /// Whether a module emitted `true` on [`EXIT_SIGNAL`]
    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Shut every module down in reverse execution order
    pub fn shutdown(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        let order: Vec<ModuleKey> = if self.order.is_empty() {
            self.modules.keys().collect()
        } else {
            self.order.clone()
        };
        for key in order.iter().rev() {
            let host = &mut self.modules[*key].host;
            if host.state() != ModuleState::Shutdown {
                // Failures were already logged by the host; keep tearing down.
                let _ = host.shutdown();
            }
        }
        self.bus = None;
        self.phase = Phase::Stopped;
        crate::engine_info!("loom::Engine", "Shut down after {} frame(s)", self.frame);
    }

    // ===== INSPECTION =====

    pub fn module_key(&self, name: &str) -> Option<ModuleKey> {
        self.names.get(name).copied()
    }

    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        let key = self.module_key(name)?;
        self.modules.get(key).map(|slot| slot.host.state())
    }

    /// Borrow a module as its concrete type
    pub fn module<M: Module + 'static>(&self, name: &str) -> Option<&M> {
        let key = self.module_key(name)?;
        self.modules.get(key)?.host.module().as_any().downcast_ref::<M>()
    }

    /// Module names in execution order (empty before `start()`)
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|key| self.modules.get(*key))
            .map(|slot| slot.config.name.as_str())
            .collect()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use loom_engine::loom::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct Quiet;
    /// impl Logger for Quiet {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Engine::set_logger(Quiet);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger) and let every severity through
    pub fn reset_logger() {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(DefaultLogger);
        }
        MIN_SEVERITY.store(LogSeverity::Trace.as_u8(), Ordering::Relaxed);
    }

    /// Discard entries below `severity`
    pub fn set_min_severity(severity: LogSeverity) {
        MIN_SEVERITY.store(severity.as_u8(), Ordering::Relaxed);
    }

    pub fn min_severity() -> LogSeverity {
        LogSeverity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(severity, source, message, None, None);
    }

    /// Internal logging method with file:line information (for ERROR logs)
    pub fn log_detailed(severity: LogSeverity, source: &str, message: String, file: &'static str, line: u32) {
        Self::dispatch(severity, source, message, Some(file), Some(line));
    }

    fn dispatch(severity: LogSeverity, source: &str, message: String, file: Option<&'static str>, line: Option<u32>) {
        if severity < Self::min_severity() {
            return;
        }
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file,
                line,
            });
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.phase == Phase::Running {
            self.shutdown();
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
