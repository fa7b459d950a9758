//! Error types for the Loom engine
//!
//! This module defines the error types used throughout the engine,
//! covering GPU contracts, module lifecycle, graph resolution and configuration.

use std::fmt;

/// Result type for Loom engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Loom engine errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (device, chain, pipeline)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, pipeline, image, asset)
    InvalidResource(String),

    /// Initialization failed (engine, module, gate construction)
    InitializationFailed(String),

    /// Operation not allowed in the current lifecycle or chain state
    InvalidState(String),

    /// Malformed or inconsistent graph configuration
    ConfigError(String),

    /// The declared module dependencies contain a cycle
    CycleDetected(Vec<String>),

    /// No factory registered under this module type name
    UnknownModuleType(String),

    /// Two module instances share the same name
    DuplicateModule(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::CycleDetected(nodes) => {
                write!(f, "Dependency cycle between modules: {}", nodes.join(", "))
            }
            Error::UnknownModuleType(name) => write!(f, "Unknown module type: {}", name),
            Error::DuplicateModule(name) => write!(f, "Duplicate module name: {}", name),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

// ===== ERROR MACROS =====

/// Log an ERROR message and build an `Error::BackendError` from it
///
/// # Example
///
/// ```ignore
/// let buffer = buffers.get(id).ok_or_else(|| engine_err!("loom::Headless", "Unknown buffer {}", id))?;
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::loom::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return early with `Err(Error::BackendError)`
///
/// # Example
///
/// ```ignore
/// if size == 0 {
///     engine_bail!("loom::Headless", "create_buffer: size must be > 0");
/// }
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
