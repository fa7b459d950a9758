//! Configuration-driven wiring
//!
//! Most ports receive a *signal name* from the graph configuration rather
//! than a value. The module then enrolls on that name, so the graph decides
//! who talks to whom.

use std::any::Any;
use std::sync::{Arc, Mutex};
use serde_json::Value;
use loom_engine::bus::{Bus, Requirement};
use loom_engine::config::{set_indexed, value_u32};
use loom_engine::engine_warn;
use loom_engine::loom::gpu::DeviceId;

fn signal_of<'a>(port: &str, value: &'a Value) -> Option<&'a str> {
    let name = value.as_str();
    if name.is_none() {
        engine_warn!("loom::Ports", "'{}' expects a signal name, got {}", port, value);
    }
    name
}

/// Enroll `setter` on every signal name delivered to `port`
pub(crate) fn follow<S, T, F>(bus: &Bus, state: &Arc<Mutex<S>>, port: String, requirement: Requirement, setter: F)
where
    S: Send + 'static,
    T: Any + Send + Sync,
    F: Fn(&mut S, &T) + Send + Sync + 'static,
{
    let setter = Arc::new(setter);
    let weak_bus = bus.downgrade();
    let weak_state = Arc::downgrade(state);
    let source = port.clone();
    bus.enroll(port, Requirement::Optional, move |value: &Value| {
        let Some(name) = signal_of(&source, value) else {
            return;
        };
        let (Some(bus), Some(state)) = (weak_bus.upgrade(), weak_state.upgrade()) else {
            return;
        };
        let setter = setter.clone();
        bus.enroll_to(&state, name, requirement, move |s: &mut S, v: &T| setter(s, v));
    });
}

/// Like [`follow`] for a list of names; the setter receives the name's position
pub(crate) fn follow_indexed<S, T, F>(bus: &Bus, state: &Arc<Mutex<S>>, port: String, requirement: Requirement, setter: F)
where
    S: Send + 'static,
    T: Any + Send + Sync,
    F: Fn(&mut S, usize, &T) + Send + Sync + 'static,
{
    let setter = Arc::new(setter);
    let weak_bus = bus.downgrade();
    let weak_state = Arc::downgrade(state);
    let source = port.clone();
    bus.enroll_indexed(port, Requirement::Optional, move |slot, value: &Value| {
        let Some(name) = signal_of(&source, value) else {
            return;
        };
        let (Some(bus), Some(state)) = (weak_bus.upgrade(), weak_state.upgrade()) else {
            return;
        };
        let setter = setter.clone();
        bus.enroll_to(&state, name, requirement, move |s: &mut S, v: &T| setter(s, slot, v));
    });
}

/// Collect the names delivered to `port` into a list, by position
pub(crate) fn names<S, F>(bus: &Bus, state: &Arc<Mutex<S>>, port: String, select: F)
where
    S: Send + 'static,
    F: Fn(&mut S) -> &mut Vec<String> + Send + Sync + 'static,
{
    let source = port.clone();
    bus.enroll_indexed_to(state, port, Requirement::Optional, move |s: &mut S, index, value: &Value| {
        if let Some(name) = signal_of(&source, value) {
            set_indexed(select(s), index, name.to_string());
        }
    });
}

/// Store a single signal name delivered to `port`
pub(crate) fn name<S, F>(bus: &Bus, state: &Arc<Mutex<S>>, port: String, select: F)
where
    S: Send + 'static,
    F: Fn(&mut S) -> &mut Option<String> + Send + Sync + 'static,
{
    let source = port.clone();
    bus.enroll_to(state, port, Requirement::Optional, move |s: &mut S, value: &Value| {
        if let Some(name) = signal_of(&source, value) {
            *select(s) = Some(name.to_string());
        }
    });
}

/// Store a device id delivered to `port`
pub(crate) fn device<S, F>(bus: &Bus, state: &Arc<Mutex<S>>, port: String, select: F)
where
    S: Send + 'static,
    F: Fn(&mut S) -> &mut Option<DeviceId> + Send + Sync + 'static,
{
    let source = port.clone();
    bus.enroll_to(state, port, Requirement::Optional, move |s: &mut S, value: &Value| {
        match value_u32(value) {
            Some(id) => *select(s) = Some(DeviceId(id)),
            None => engine_warn!("loom::Ports", "'{}' expects a device id, got {}", source, value),
        }
    });
}

/// Store a `u32` delivered to `port`
pub(crate) fn dimension<S, F>(bus: &Bus, state: &Arc<Mutex<S>>, port: String, apply: F)
where
    S: Send + 'static,
    F: Fn(&mut S, u32) + Send + Sync + 'static,
{
    let source = port.clone();
    bus.enroll_to(state, port, Requirement::Optional, move |s: &mut S, value: &Value| {
        match value_u32(value) {
            Some(v) => apply(s, v),
            None => engine_warn!("loom::Ports", "'{}' expects an unsigned integer, got {}", source, value),
        }
    });
}
