//! Unit tests for ResourceGate
//!
//! Construct-once semantics, invalidation and construction failures.

use crate::error::Error;
use crate::resource::{GateState, GateStatus, ResourceGate};

#[test]
fn test_gate_waits_until_every_precondition_holds() {
    let mut gate = ResourceGate::new("draw");
    let mut constructed = 0;
    let status = gate
        .poll(&[("device", true), ("parent_chain", false), ("subpass", false)], |_| {
            constructed += 1;
            Ok(())
        })
        .unwrap();
    assert_eq!(
        status,
        GateStatus::Waiting { missing: vec!["parent_chain".to_string(), "subpass".to_string()] }
    );
    assert_eq!(constructed, 0);
    assert_eq!(gate.state(), GateState::Waiting);
    assert_eq!(gate.generation(), 0);
}

#[test]
fn test_gate_constructs_at_most_once_per_generation() {
    let mut gate = ResourceGate::new("draw");
    let mut constructed = 0;
    for _ in 0..5 {
        let status = gate
            .poll(&[("device", true)], |generation| {
                assert_eq!(generation, 1);
                constructed += 1;
                Ok(())
            })
            .unwrap();
        assert!(status.is_open());
    }
    assert_eq!(constructed, 1);
    assert_eq!(gate.state(), GateState::Ready { generation: 1 });
}

#[test]
fn test_invalidate_rearms_with_next_generation() {
    let mut gate = ResourceGate::new("draw");
    gate.poll(&[], |_| Ok(())).unwrap();
    gate.invalidate();
    assert_eq!(gate.state(), GateState::Invalidated { generation: 1 });
    assert!(!gate.is_ready());

    // Preconditions missing after invalidation: nothing is rebuilt.
    let status = gate.poll(&[("parent_chain", false)], |_| panic!("must not construct")).unwrap();
    assert!(!status.is_open());

    let status = gate.poll(&[("parent_chain", true)], |_| Ok(())).unwrap();
    assert_eq!(status, GateStatus::Constructed { generation: 2 });
}

#[test]
fn test_invalidate_before_construction_is_noop() {
    let mut gate = ResourceGate::new("draw");
    gate.invalidate();
    assert_eq!(gate.state(), GateState::Waiting);
}

#[test]
fn test_failed_construction_leaves_gate_armed() {
    let mut gate = ResourceGate::new("draw");
    let err = gate
        .poll(&[("device", true)], |_| Err(Error::InitializationFailed("no memory".into())))
        .unwrap_err();
    assert!(matches!(err, Error::InitializationFailed(_)));
    assert_eq!(gate.state(), GateState::Waiting);

    let status = gate.poll(&[("device", true)], |_| Ok(())).unwrap();
    assert_eq!(status, GateStatus::Constructed { generation: 1 });
}
