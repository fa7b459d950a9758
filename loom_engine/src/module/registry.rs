/// Module registry - static table of module factories by type name

use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::module::Module;

/// Factory creating a fresh, unconfigured instance
pub type ModuleFactory = fn() -> Box<dyn Module>;

/// One entry of a registration table
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    pub type_name: &'static str,
    pub version: u32,
    pub make: ModuleFactory,
}

/// Module types available to a graph configuration
///
/// Plugin crates expose a `&'static [ModuleDescriptor]` table and register it
/// in one call. Instances are destroyed by dropping them.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: FxHashMap<&'static str, ModuleDescriptor>,
    order: Vec<&'static str>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a table
    pub fn from_table(table: &[ModuleDescriptor]) -> Result<Self> {
        let mut registry = Self::new();
        registry.register_table(table)?;
        Ok(registry)
    }

    /// Register one module type
    ///
    /// # Errors
    ///
    /// `DuplicateModule` if the type name is already taken.
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<()> {
        if self.entries.contains_key(descriptor.type_name) {
            return Err(Error::DuplicateModule(descriptor.type_name.to_string()));
        }
        self.order.push(descriptor.type_name);
        self.entries.insert(descriptor.type_name, descriptor);
        Ok(())
    }

    pub fn register_table(&mut self, table: &[ModuleDescriptor]) -> Result<()> {
        for descriptor in table {
            self.register(*descriptor)?;
        }
        Ok(())
    }

    /// Create an instance of `type_name`
    pub fn make(&self, type_name: &str) -> Result<Box<dyn Module>> {
        self.entries
            .get(type_name)
            .map(|descriptor| (descriptor.make)())
            .ok_or_else(|| Error::UnknownModuleType(type_name.to_string()))
    }

    pub fn descriptor(&self, type_name: &str) -> Option<&ModuleDescriptor> {
        self.entries.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// Registered type names in registration order
    pub fn types(&self) -> &[&'static str] {
        &self.order
    }
}
