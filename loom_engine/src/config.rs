//! Graph configuration
//!
//! A graph is described in JSON:
//!
//! ```json
//! {
//!   "channel": 0,
//!   "modules": [
//!     { "type": "Camera", "name": "cam", "params": { "outputs": ["cam::view"] } },
//!     { "type": "DrawModel", "name": "scene", "after": ["cam"], "params": { "device": 0 } }
//!   ]
//! }
//! ```
//!
//! Parameters reach modules as `serde_json::Value` signals on
//! `"<name>::<key>"` once every module has subscribed.

use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::bus::{signal_name, Bus, ChannelId};
use crate::error::{Error, Result};

/// One module instance of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Registered type name
    #[serde(rename = "type")]
    pub type_name: String,
    /// Unique instance name
    pub name: String,
    /// Instances this one executes after
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ModuleConfig {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            after: Vec::new(),
            params: Map::new(),
        }
    }

    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.after.push(dependency.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Emit every parameter on `"<name>::<key>"`
    ///
    /// Arrays of scalars are delivered element by element with their position
    /// as slot index; objects and arrays holding objects are delivered whole.
    /// Returns the number of deliveries.
    pub fn deliver(&self, bus: &Bus) -> usize {
        let mut delivered = 0;
        for (key, value) in &self.params {
            let name = signal_name(&self.name, key);
            match value {
                Value::Array(items) if items.iter().all(is_scalar) => {
                    for (index, item) in items.iter().enumerate() {
                        delivered += bus.emit_indexed(&name, item.clone(), index);
                    }
                }
                _ => delivered += bus.emit_value(&name, value.clone()),
            }
        }
        delivered
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// A full module graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub channel: ChannelId,
    pub modules: Vec<ModuleConfig>,
}

impl GraphConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GraphConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject empty or duplicate names and dangling `after` references
    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.modules.len());
        for module in &self.modules {
            if module.name.is_empty() {
                return Err(Error::ConfigError(format!("a '{}' module has no name", module.type_name)));
            }
            if seen.contains(&module.name.as_str()) {
                return Err(Error::DuplicateModule(module.name.clone()));
            }
            seen.push(module.name.as_str());
        }
        for module in &self.modules {
            for dependency in &module.after {
                if !seen.contains(&dependency.as_str()) {
                    return Err(Error::ConfigError(format!(
                        "'{}' runs after unknown module '{}'",
                        module.name, dependency
                    )));
                }
            }
        }
        Ok(())
    }
}

// ===== PARAMETER READERS =====

/// Read a `u32` parameter value
pub fn value_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

/// Read an `f32` parameter value
pub fn value_f32(value: &Value) -> Option<f32> {
    value.as_f64().map(|v| v as f32)
}

/// Store `value` at `index`, growing `list` with defaults
pub fn set_indexed<T: Default + Clone>(list: &mut Vec<T>, index: usize, value: T) {
    if index >= list.len() {
        list.resize(index + 1, T::default());
    }
    list[index] = value;
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
