use crate::camera::Camera;
use glam::{Mat4, Vec3, Vec4};
use loom_engine::bus::{ChannelId, Requirement, SignalRouter};
use loom_engine::loom::{Module, ModuleContext, Services};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn subscribed() -> (SignalRouter, Camera, loom_engine::bus::Bus) {
    let router = SignalRouter::new();
    let mut camera = Camera::new();
    let ctx = ModuleContext::new("cam", router.bus(ChannelId(0)), Services::default());
    camera.subscribe(&ctx).unwrap();
    let driver = router.bus(ChannelId(0));
    (router, camera, driver)
}

#[test]
fn test_view_emitted_on_every_output_each_frame() {
    let (_router, mut camera, driver) = subscribed();
    let seen = Arc::new(Mutex::new(Vec::<Mat4>::new()));
    for name in ["scene::view", "sprites::view"] {
        driver.enroll_to(&seen, name, Requirement::Optional, |s: &mut Vec<Mat4>, m: &Mat4| s.push(*m));
    }
    driver.emit_indexed("cam::outputs", json!("scene::view"), 0);
    driver.emit_indexed("cam::outputs", json!("sprites::view"), 1);

    camera.execute().unwrap();
    camera.execute().unwrap();
    assert_eq!(seen.lock().unwrap().len(), 4);
}

#[test]
fn test_translate_accumulates() {
    let (_router, mut camera, driver) = subscribed();
    driver.emit_value("cam::position", Vec4::new(1.0, 0.0, 0.0, 1.0));
    driver.emit_value("cam::translate", Vec4::new(0.0, 2.0, 0.0, 0.0));
    driver.emit_value("cam::translate", Vec4::new(0.0, 2.0, 0.0, 0.0));
    camera.execute().unwrap();
    assert_eq!(camera.position(), Vec3::new(1.0, 4.0, 0.0));
    assert_eq!(camera.view(), Mat4::from_translation(Vec3::new(-1.0, -4.0, 0.0)));
}

#[test]
fn test_lookat_is_a_direction_from_the_position() {
    let (_router, mut camera, driver) = subscribed();
    driver.emit_value("cam::position", Vec4::new(0.0, 0.0, 5.0, 1.0));
    driver.emit_value("cam::lookat", Vec4::new(0.0, 0.0, -1.0, 0.0));
    camera.execute().unwrap();
    let origin_in_view = camera.view() * Vec4::new(0.0, 0.0, 0.0, 1.0);
    assert!(origin_in_view.truncate().abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
}

#[test]
fn test_moving_after_lookat_keeps_the_direction() {
    let (_router, mut camera, driver) = subscribed();
    driver.emit_value("cam::position", Vec4::new(0.0, 0.0, 5.0, 1.0));
    driver.emit_value("cam::lookat", Vec4::new(0.0, 0.0, -1.0, 0.0));
    camera.execute().unwrap();

    driver.emit_value("cam::translate", Vec4::new(3.0, 0.0, 0.0, 0.0));
    camera.execute().unwrap();
    assert_eq!(camera.position(), Vec3::new(3.0, 0.0, 5.0));
    let ahead = camera.view() * Vec4::new(3.0, 0.0, 0.0, 1.0);
    assert!(ahead.truncate().abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    let old_target = camera.view() * Vec4::new(0.0, 0.0, 0.0, 1.0);
    assert!(old_target.truncate().abs_diff_eq(Vec3::new(-3.0, 0.0, -5.0), 1e-5));
}

#[test]
fn test_lookat_straight_down_stays_finite() {
    let (_router, mut camera, driver) = subscribed();
    driver.emit_value("cam::position", Vec4::new(0.0, 10.0, 0.0, 1.0));
    driver.emit_value("cam::lookat", Vec4::new(0.0, -1.0, 0.0, 0.0));
    camera.execute().unwrap();
    assert!(camera.view().is_finite());
}

#[test]
fn test_transform_is_post_multiplied() {
    let (_router, mut camera, driver) = subscribed();
    let spin = Mat4::from_rotation_y(0.5);
    driver.emit_value("cam::transform", spin);
    driver.emit_value("cam::transform", spin);
    camera.execute().unwrap();
    assert!(camera.view().abs_diff_eq(Mat4::from_rotation_y(1.0), 1e-5));
}
