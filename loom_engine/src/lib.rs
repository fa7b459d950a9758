/*!
# Loom Engine

Dataflow runtime for rendering-engine plugin modules.

Modules are self-contained units wired together at runtime through a
named-signal bus instead of direct references. Each module follows the same
lifecycle (subscribe, lazy initialize, execute every frame, shutdown), builds
its GPU objects behind a resource gate once its inputs exist, and mirrors
host-side data to the device through dirty-tracked buffers.

## Architecture

- **Bus**: named, typed signals scoped to a channel; Required inputs gate `wait()`
- **Module**: lifecycle trait, static registry, dependency-ordered execution
- **Resource**: lazy construction gate and dirty-flag host/device mirrors
- **Gpu**: narrow device/chain/pipeline/render-pass contracts plus a headless backend
- **Asset**: request/callback broker fulfilling each request exactly once
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod bus;
pub mod module;
pub mod resource;
pub mod gpu;
pub mod asset;
pub mod config;
pub mod utils;

// Main loom namespace module
pub mod loom {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine
    pub use crate::engine::{Engine, EngineConfig, ModuleKey, EXIT_SIGNAL};

    // Configuration
    pub use crate::config::{GraphConfig, ModuleConfig};

    // Module lifecycle
    pub use crate::module::{Module, ModuleContext, ModuleDescriptor, ModuleRegistry, ModuleState, Services};

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    pub mod bus {
        pub use crate::bus::*;
    }

    pub mod resource {
        pub use crate::resource::*;
    }

    pub mod gpu {
        pub use crate::gpu::*;
    }

    pub mod asset {
        pub use crate::asset::*;
    }
}

// Re-export math library at crate root
pub use glam;
