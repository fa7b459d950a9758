use crate::signals::Placement;
use glam::{Mat4, Vec3, Vec4};

#[test]
fn test_placement_defaults_from_json() {
    let placement: Placement = serde_json::from_str(r#"{ "id": "tree", "asset": "pine" }"#).unwrap();
    assert_eq!(placement, Placement::new("tree", "pine"));
    assert_eq!(placement.transform(), Mat4::IDENTITY);
}

#[test]
fn test_placement_transform_scales_then_translates() {
    let mut placement = Placement::new("rock", "boulder").at([1.0, 2.0, 3.0]);
    placement.scale = [2.0, 2.0, 2.0];
    let moved = placement.transform() * Vec4::new(1.0, 0.0, 0.0, 1.0);
    assert_eq!(moved.truncate(), Vec3::new(3.0, 2.0, 3.0));
}

#[test]
fn test_placement_missing_asset_is_rejected() {
    assert!(serde_json::from_str::<Placement>(r#"{ "id": "tree" }"#).is_err());
}
