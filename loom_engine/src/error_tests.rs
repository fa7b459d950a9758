//! Unit tests for error.rs
//!
//! Tests Error variants, Display, conversions and the error macros.

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("chain lost".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("chain lost"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_invalid_state_display() {
    let err = Error::InvalidState("execute 'cam' in state Unconfigured".to_string());
    assert!(format!("{}", err).starts_with("Invalid state"));
}

#[test]
fn test_cycle_detected_lists_nodes() {
    let err = Error::CycleDetected(vec!["a".to_string(), "b".to_string()]);
    assert_eq!(format!("{}", err), "Dependency cycle between modules: a, b");
}

#[test]
fn test_unknown_and_duplicate_module_display() {
    assert!(format!("{}", Error::UnknownModuleType("Blur".into())).contains("Blur"));
    assert!(format!("{}", Error::DuplicateModule("cam".into())).contains("cam"));
}

// ============================================================================
// CONVERSION TESTS
// ============================================================================

#[test]
fn test_from_serde_json_error_is_config_error() {
    let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ not json");
    let err: Error = parse.unwrap_err().into();
    assert!(matches!(err, Error::ConfigError(_)));
}

#[test]
fn test_from_io_error_is_config_error() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "graph.json");
    let err: Error = io.into();
    assert!(matches!(err, Error::ConfigError(msg) if msg.contains("graph.json")));
}

#[test]
fn test_error_is_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(Error::OutOfMemory);
    assert_eq!(err.to_string(), "Out of GPU memory");
}

// ============================================================================
// MACRO TESTS
// ============================================================================

fn bail_when(flag: bool) -> Result<u32> {
    if flag {
        crate::engine_bail!("loom::test", "flag was {}", flag);
    }
    Ok(7)
}

#[test]
fn test_engine_bail_returns_backend_error() {
    assert_eq!(bail_when(false), Ok(7));
    assert_eq!(bail_when(true), Err(Error::BackendError("flag was true".to_string())));
}

#[test]
fn test_engine_err_builds_error() {
    let err = crate::engine_err!("loom::test", "missing {}", "device");
    assert_eq!(err, Error::BackendError("missing device".to_string()));
}
