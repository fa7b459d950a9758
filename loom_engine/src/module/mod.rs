//! Module lifecycle, registration and ordering

mod module;
mod context;
mod registry;
mod graph;

pub use module::{Module, ModuleHost, ModuleState};
pub use context::{ModuleContext, Services};
pub use registry::{ModuleDescriptor, ModuleFactory, ModuleRegistry};
pub use graph::ExecutionGraph;
