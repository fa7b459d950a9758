//! Unit tests for graph configuration

use crate::bus::{ChannelId, Requirement, SignalRouter};
use crate::config::{set_indexed, value_f32, value_u32, GraphConfig, ModuleConfig};
use crate::error::Error;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

const GRAPH: &str = r#"{
    "channel": 3,
    "modules": [
        { "type": "Camera", "name": "cam", "params": { "outputs": ["pass::projection"] } },
        { "type": "RenderPass", "name": "pass", "after": ["cam"], "params": { "width": 640 } }
    ]
}"#;

// ============================================================================
// PARSING
// ============================================================================

#[test]
fn test_parse_graph() {
    let graph = GraphConfig::from_json_str(GRAPH).unwrap();
    assert_eq!(graph.channel, ChannelId(3));
    assert_eq!(graph.modules.len(), 2);
    assert_eq!(graph.modules[0].type_name, "Camera");
    assert_eq!(graph.modules[1].after, vec!["cam"]);
    assert_eq!(graph.modules[1].params["width"], json!(640));
}

#[test]
fn test_channel_and_params_default() {
    let graph = GraphConfig::from_json_str(r#"{ "modules": [ { "type": "Window", "name": "w" } ] }"#).unwrap();
    assert_eq!(graph.channel, ChannelId(0));
    assert!(graph.modules[0].params.is_empty());
    assert!(graph.modules[0].after.is_empty());
}

#[test]
fn test_malformed_json_is_config_error() {
    assert!(matches!(GraphConfig::from_json_str("{ modules: "), Err(Error::ConfigError(_))));
}

#[test]
fn test_missing_file_is_config_error() {
    assert!(matches!(
        GraphConfig::from_path("/nonexistent/loom/graph.json"),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn test_serialized_graph_parses_back() {
    let graph = GraphConfig::from_json_str(GRAPH).unwrap();
    let text = graph.to_json_string().unwrap();
    assert!(text.contains("\"type\": \"Camera\""));
    assert_eq!(GraphConfig::from_json_str(&text).unwrap(), graph);
}

// ============================================================================
// VALIDATION
// ============================================================================

#[test]
fn test_duplicate_names_rejected() {
    let graph = GraphConfig {
        channel: ChannelId(0),
        modules: vec![ModuleConfig::new("Camera", "a"), ModuleConfig::new("Window", "a")],
    };
    assert_eq!(graph.validate(), Err(Error::DuplicateModule("a".to_string())));
}

#[test]
fn test_empty_name_rejected() {
    let graph = GraphConfig {
        channel: ChannelId(0),
        modules: vec![ModuleConfig::new("Camera", "")],
    };
    assert!(matches!(graph.validate(), Err(Error::ConfigError(_))));
}

#[test]
fn test_unknown_after_rejected() {
    let graph = GraphConfig {
        channel: ChannelId(0),
        modules: vec![ModuleConfig::new("Camera", "cam").after("ghost")],
    };
    assert!(matches!(graph.validate(), Err(Error::ConfigError(_))));
}

// ============================================================================
// DELIVERY
// ============================================================================

#[test]
fn test_scalar_array_delivered_by_index() {
    let router = SignalRouter::new();
    let bus = router.bus(ChannelId(0));
    let received = Arc::new(Mutex::new(Vec::<String>::new()));
    bus.enroll_indexed_to(&received, "cam::outputs", Requirement::Optional, |list: &mut Vec<String>, index, value: &Value| {
        set_indexed(list, index, value.as_str().unwrap_or_default().to_string());
    });

    let config = ModuleConfig::new("Camera", "cam").param("outputs", json!(["a::camera", "b::camera"]));
    assert_eq!(config.deliver(&bus), 2);
    assert_eq!(*received.lock().unwrap(), vec!["a::camera", "b::camera"]);
}

#[test]
fn test_object_array_delivered_whole() {
    let router = SignalRouter::new();
    let bus = router.bus(ChannelId(0));
    let received = Arc::new(Mutex::new(Value::Null));
    bus.enroll_to(&received, "db::models", Requirement::Optional, |slot: &mut Value, value: &Value| {
        *slot = value.clone();
    });

    let models = json!([{ "id": "cube", "path": "cube.obj" }]);
    let config = ModuleConfig::new("AssetDatabase", "db").param("models", models.clone());
    assert_eq!(config.deliver(&bus), 1);
    assert_eq!(*received.lock().unwrap(), models);
}

#[test]
fn test_params_without_enrollment_deliver_nothing() {
    let router = SignalRouter::new();
    let bus = router.bus(ChannelId(0));
    let config = ModuleConfig::new("Window", "w").param("width", json!(800));
    assert_eq!(config.deliver(&bus), 0);
}

// ============================================================================
// PARAMETER READERS
// ============================================================================

#[test]
fn test_value_readers() {
    assert_eq!(value_u32(&json!(640)), Some(640));
    assert_eq!(value_u32(&json!(-1)), None);
    assert_eq!(value_u32(&json!(u64::MAX)), None);
    assert_eq!(value_f32(&json!(1.5)), Some(1.5));
    assert_eq!(value_f32(&json!("1.5")), None);
}

#[test]
fn test_set_indexed_grows_list() {
    let mut list: Vec<u32> = Vec::new();
    set_indexed(&mut list, 2, 7);
    assert_eq!(list, vec![0, 0, 7]);
    set_indexed(&mut list, 0, 1);
    assert_eq!(list, vec![1, 0, 7]);
}
