//! Unit tests for Engine
//!
//! Graph loading, lifecycle ordering, exit requests and the logging API.
//! Tests touching the global logger run serially.

use crate::bus::Requirement;
use crate::config::{value_u32, GraphConfig, ModuleConfig};
use crate::engine::{Engine, EngineConfig, EXIT_SIGNAL};
use crate::error::{Error, Result};
use crate::log::{LogEntry, LogSeverity, Logger};
use crate::module::{Module, ModuleContext, ModuleDescriptor, ModuleRegistry, ModuleState};
use crate::bus::Bus;
use serde_json::{json, Value};
use serial_test::serial;
use std::any::Any;
use std::sync::{Arc, Mutex};

type Journal = Arc<Mutex<Vec<String>>>;

/// Module writing "<name>:<call>" into a shared journal
struct Recorder {
    name: String,
    journal: Journal,
    width: Arc<Mutex<Option<u32>>>,
    bus: Option<Bus>,
    exit_on_frame: Option<u32>,
    frames: u32,
}

impl Recorder {
    fn new(journal: &Journal) -> Self {
        Self {
            name: String::new(),
            journal: journal.clone(),
            width: Arc::new(Mutex::new(None)),
            bus: None,
            exit_on_frame: None,
            frames: 0,
        }
    }

    fn record(&self, call: &str) {
        self.journal.lock().unwrap().push(format!("{}:{}", self.name, call));
    }
}

impl Module for Recorder {
    fn type_name(&self) -> &'static str {
        "Recorder"
    }

    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.name = ctx.name().to_string();
        ctx.bus().enroll_to(&self.width, ctx.port("width"), Requirement::Optional, |width: &mut Option<u32>, value: &Value| {
            *width = value_u32(value);
        });
        self.bus = Some(ctx.bus().clone());
        self.record("subscribe");
        Ok(())
    }

    fn initialize(&mut self) -> Result<()> {
        let width = *self.width.lock().unwrap();
        self.record(&format!("initialize({:?})", width));
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        self.frames += 1;
        self.record("execute");
        if Some(self.frames) == self.exit_on_frame {
            if let Some(bus) = &self.bus {
                bus.emit_value(EXIT_SIGNAL, true);
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.record("shutdown");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Idle;

impl Module for Idle {
    fn type_name(&self) -> &'static str {
        "Idle"
    }
    fn subscribe(&mut self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }
    fn execute(&mut self) -> Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn make_idle() -> Box<dyn Module> {
    Box::new(Idle)
}

const IDLE: ModuleDescriptor = ModuleDescriptor { type_name: "Idle", version: 1, make: make_idle };

/// Logger capturing entries for inspection
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_lifecycle_follows_dependency_order() {
    let journal = journal();
    let mut engine = Engine::new(EngineConfig::default());
    engine
        .add_module(ModuleConfig::new("Recorder", "window").after("pass"), Box::new(Recorder::new(&journal)))
        .unwrap();
    engine
        .add_module(ModuleConfig::new("Recorder", "pass"), Box::new(Recorder::new(&journal)))
        .unwrap();

    engine.start().unwrap();
    assert_eq!(engine.execution_order(), vec!["pass", "window"]);
    engine.tick().unwrap();
    engine.shutdown();

    assert_eq!(
        entries(&journal),
        vec![
            "pass:subscribe",
            "window:subscribe",
            "pass:initialize(None)",
            "window:initialize(None)",
            "pass:execute",
            "window:execute",
            "window:shutdown",
            "pass:shutdown",
        ]
    );
    assert_eq!(engine.module_state("pass"), Some(ModuleState::Shutdown));
}

#[test]
fn test_params_arrive_before_initialize() {
    let journal = journal();
    let mut engine = Engine::new(EngineConfig::default());
    engine
        .add_module(
            ModuleConfig::new("Recorder", "win").param("width", json!(800)),
            Box::new(Recorder::new(&journal)),
        )
        .unwrap();
    engine.start().unwrap();
    assert!(entries(&journal).contains(&"win:initialize(Some(800))".to_string()));
}

#[test]
fn test_tick_before_start_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default());
    assert!(matches!(engine.tick(), Err(Error::InvalidState(_))));
}

#[test]
fn test_start_twice_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.start().unwrap();
    assert!(matches!(engine.start(), Err(Error::InvalidState(_))));
}

#[test]
fn test_add_module_after_start_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.start().unwrap();
    let result = engine.add_module(ModuleConfig::new("Idle", "late"), Box::new(Idle));
    assert!(matches!(result, Err(Error::InvalidState(_))));
}

#[test]
fn test_duplicate_module_name_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_module(ModuleConfig::new("Idle", "a"), Box::new(Idle)).unwrap();
    let result = engine.add_module(ModuleConfig::new("Idle", "a"), Box::new(Idle));
    assert_eq!(result.err(), Some(Error::DuplicateModule("a".to_string())));
    assert_eq!(engine.module_count(), 1);
}

#[test]
fn test_cycle_fails_start() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_module(ModuleConfig::new("Idle", "a").after("b"), Box::new(Idle)).unwrap();
    engine.add_module(ModuleConfig::new("Idle", "b").after("a"), Box::new(Idle)).unwrap();
    assert!(matches!(engine.start(), Err(Error::CycleDetected(_))));
}

#[test]
fn test_shutdown_is_idempotent_and_ends_ticking() {
    let journal = journal();
    let mut engine = Engine::new(EngineConfig::default());
    engine.add_module(ModuleConfig::new("Recorder", "r"), Box::new(Recorder::new(&journal))).unwrap();
    engine.start().unwrap();
    engine.shutdown();
    engine.shutdown();
    assert!(engine.tick().is_err());
    let shutdowns = entries(&journal).iter().filter(|e| e.ends_with("shutdown")).count();
    assert_eq!(shutdowns, 1);
}

#[test]
fn test_drop_shuts_running_engine_down() {
    let journal = journal();
    {
        let mut engine = Engine::new(EngineConfig::default());
        engine.add_module(ModuleConfig::new("Recorder", "r"), Box::new(Recorder::new(&journal))).unwrap();
        engine.start().unwrap();
    }
    assert_eq!(entries(&journal).last().map(String::as_str), Some("r:shutdown"));
}

// ============================================================================
// EXIT SIGNAL
// ============================================================================

#[test]
fn test_exit_signal_stops_run_frames() {
    let journal = journal();
    let mut recorder = Recorder::new(&journal);
    recorder.exit_on_frame = Some(3);

    let mut engine = Engine::new(EngineConfig::default());
    engine.add_module(ModuleConfig::new("Recorder", "w"), Box::new(recorder)).unwrap();
    engine.start().unwrap();
    assert!(!engine.exit_requested());

    assert_eq!(engine.run_frames(10).unwrap(), 3);
    assert!(engine.exit_requested());
}

// ============================================================================
// GRAPH LOADING
// ============================================================================

#[test]
fn test_load_from_registry() {
    let registry = ModuleRegistry::from_table(&[IDLE]).unwrap();
    let graph = GraphConfig::from_json_str(
        r#"{ "channel": 2, "modules": [ { "type": "Idle", "name": "a" }, { "type": "Idle", "name": "b", "after": ["a"] } ] }"#,
    )
    .unwrap();

    let mut engine = Engine::new(EngineConfig::default());
    engine.load(&graph, &registry).unwrap();
    assert_eq!(engine.channel().0, 2);
    engine.start().unwrap();
    assert_eq!(engine.run_frames(2).unwrap(), 2);
    assert!(engine.module::<Idle>("b").is_some());
    assert!(engine.module::<Recorder>("b").is_none());
}

#[test]
fn test_load_unknown_type_fails() {
    let registry = ModuleRegistry::new();
    let graph = GraphConfig::from_json_str(r#"{ "modules": [ { "type": "Ghost", "name": "g" } ] }"#).unwrap();
    let mut engine = Engine::new(EngineConfig::default());
    assert_eq!(
        engine.load(&graph, &registry).err(),
        Some(Error::UnknownModuleType("Ghost".to_string()))
    );
}

#[test]
fn test_registry_rejects_duplicate_type() {
    let mut registry = ModuleRegistry::new();
    registry.register(IDLE).unwrap();
    assert_eq!(registry.register(IDLE).err(), Some(Error::DuplicateModule("Idle".to_string())));
    assert_eq!(registry.types(), &["Idle"]);
    assert_eq!(registry.descriptor("Idle").map(|d| d.version), Some(1));
}

// ============================================================================
// LOGGING API
// ============================================================================

#[test]
#[serial]
fn test_custom_logger_receives_engine_logs() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(CaptureLogger { entries: captured.clone() });

    let mut engine = Engine::new(EngineConfig::default());
    let _ = engine.tick();

    Engine::reset_logger();
    let entries = captured.lock().unwrap();
    let error = entries
        .iter()
        .find(|e| e.source == "loom::Engine" && e.message.contains("tick before start"))
        .expect("tick error logged");
    assert_eq!(error.severity, LogSeverity::Error);
    assert!(error.file.is_some());
    assert!(error.line.is_some());
}

#[test]
#[serial]
fn test_min_severity_filters_entries() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(CaptureLogger { entries: captured.clone() });
    Engine::set_min_severity(LogSeverity::Warn);
    assert_eq!(Engine::min_severity(), LogSeverity::Warn);

    Engine::log(LogSeverity::Info, "test::filter", "hidden".to_string());
    Engine::log(LogSeverity::Warn, "test::filter", "shown".to_string());

    Engine::reset_logger();
    assert_eq!(Engine::min_severity(), LogSeverity::Trace);
    let messages: Vec<String> = captured
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.source == "test::filter")
        .map(|e| e.message.clone())
        .collect();
    assert_eq!(messages, vec!["shown"]);
}

#[test]
#[serial]
fn test_engine_err_macro_logs_and_builds_backend_error() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(CaptureLogger { entries: captured.clone() });

    let err = crate::engine_err!("test::macro", "device {} lost", 2);

    Engine::reset_logger();
    assert_eq!(err, Error::BackendError("device 2 lost".to_string()));
    assert!(captured
        .lock()
        .unwrap()
        .iter()
        .any(|e| e.source == "test::macro" && e.severity == LogSeverity::Error));
}
