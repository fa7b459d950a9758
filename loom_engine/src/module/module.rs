/// Module trait and the host enforcing its lifecycle

use std::any::Any;
use crate::error::{Error, Result};
use crate::module::ModuleContext;
use crate::{engine_error, engine_info, engine_warn};

/// Self-contained unit of work wired to others through the bus
///
/// Lifecycle: `subscribe` once, `initialize` once (best effort),
/// `execute` once per frame, `shutdown` once. Anything that needs inputs from
/// other modules is built lazily in `execute` behind a resource gate.
pub trait Module: Send {
    /// Registered type name
    fn type_name(&self) -> &'static str;

    /// Register enrollments and publications; no GPU work
    fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()>;

    /// Build whatever does not depend on other modules
    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// One frame of work; ends with an emit or a chain advance
    fn execute(&mut self) -> Result<()>;

    /// Wait for outstanding GPU work and release resources
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unconfigured,
    Subscribed,
    Initialized,
    Executing,
    Shutdown,
}

/// Owns one module instance and rejects out-of-order lifecycle calls
pub struct ModuleHost {
    name: String,
    source: String,
    state: ModuleState,
    module: Box<dyn Module>,
}

impl ModuleHost {
    pub fn new(name: impl Into<String>, module: Box<dyn Module>) -> Self {
        let name = name.into();
        let source = format!("loom::{}[{}]", module.type_name(), name);
        Self {
            name,
            source,
            state: ModuleState::Unconfigured,
            module,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.module.type_name()
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    fn reject(&self, operation: &str) -> Error {
        let message = format!("{} '{}' in state {:?}", operation, self.name, self.state);
        engine_error!(&self.source, "{}", message);
        Error::InvalidState(message)
    }

    pub fn subscribe(&mut self, ctx: &ModuleContext) -> Result<()> {
        if self.state != ModuleState::Unconfigured {
            return Err(self.reject("subscribe"));
        }
        self.module.subscribe(ctx)?;
        self.state = ModuleState::Subscribed;
        Ok(())
    }

    /// Initialization failures are logged and tolerated: the module retries lazily
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != ModuleState::Subscribed {
            return Err(self.reject("initialize"));
        }
        if let Err(err) = self.module.initialize() {
            engine_warn!(&self.source, "Initialization deferred: {}", err);
        }
        self.state = ModuleState::Initialized;
        engine_info!(&self.source, "Initialized");
        Ok(())
    }

    pub fn execute(&mut self) -> Result<()> {
        match self.state {
            ModuleState::Initialized | ModuleState::Executing => {}
            _ => return Err(self.reject("execute")),
        }
        self.state = ModuleState::Executing;
        self.module.execute()
    }

    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == ModuleState::Shutdown {
            return Err(self.reject("shutdown"));
        }
        let result = self.module.shutdown();
        self.state = ModuleState::Shutdown;
        if let Err(err) = &result {
            engine_warn!(&self.source, "Shutdown reported: {}", err);
        }
        result
    }
}

#[cfg(test)]
#[path = "module_tests.rs"]
mod tests;
