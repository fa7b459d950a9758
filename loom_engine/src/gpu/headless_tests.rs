//! Unit tests for the headless device
//!
//! Chain state validation, ring advance, combine, present and surface loss.

use crate::error::Error;
use crate::gpu::headless::{Command, HeadlessChain, HeadlessConfig, HeadlessDevice};
use crate::gpu::{
    BufferDesc, BufferUsage, Chain, ChainCycle, ChainDesc, ChainState, CycleOutcome, Device,
    ImageDesc, ImageFormat, PipelineDesc, PipelineKind, PresentStatus, RenderPassDesc, SubpassDesc,
};
use std::sync::{Arc, Mutex};
use winit::dpi::PhysicalSize;

fn headless(chain: &Arc<Mutex<dyn Chain>>) -> std::sync::MutexGuard<'_, dyn Chain + 'static> {
    chain.lock().unwrap()
}

fn pass_desc(name: &str) -> RenderPassDesc {
    RenderPassDesc {
        name: name.to_string(),
        extent: PhysicalSize::new(64, 32),
        subpasses: vec![SubpassDesc::default()],
    }
}

// ============================================================================
// CHAIN STATE TESTS
// ============================================================================

#[test]
fn test_new_chain_is_uninitialized() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let guard = headless(&chain);
    assert_eq!(guard.state(), ChainState::Uninitialized);
    assert_eq!(guard.ring_index(), 0);
    assert_eq!(guard.ring_size(), 3);
}

#[test]
fn test_record_submit_cycle() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let mut guard = headless(&chain);
    guard.begin().unwrap();
    assert_eq!(guard.state(), ChainState::Recording);
    guard.draw(3).unwrap();
    guard.end().unwrap();
    assert_eq!(guard.state(), ChainState::Idle);
    guard.submit().unwrap();
    assert_eq!(guard.state(), ChainState::Submitted);
    assert_eq!(guard.ring_index(), 1);
    guard.synchronize().unwrap();
    assert_eq!(guard.state(), ChainState::Idle);
}

#[test]
fn test_draw_outside_recording_is_rejected() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let mut guard = headless(&chain);
    assert!(matches!(guard.draw(3), Err(Error::InvalidState(_))));
    assert!(matches!(guard.submit(), Err(Error::InvalidState(_))));
    guard.begin().unwrap();
    assert!(matches!(guard.begin(), Err(Error::InvalidState(_))));
    assert!(matches!(guard.advance(), Err(Error::InvalidState(_))));
}

#[test]
fn test_advance_wraps_ring() {
    let device = HeadlessDevice::new(HeadlessConfig { ring_size: 2, ..Default::default() });
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let mut guard = headless(&chain);
    guard.advance().unwrap();
    assert_eq!(guard.ring_index(), 1);
    guard.advance().unwrap();
    assert_eq!(guard.ring_index(), 0);
    assert_eq!(device.stats().advances, 2);
}

#[test]
fn test_copy_outside_recording_makes_chain_submittable() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let buffer = device
        .create_buffer(BufferDesc { name: "b".into(), size: 8, usage: BufferUsage::Storage })
        .unwrap();
    let mut guard = headless(&chain);
    guard.copy(&[1, 2, 3, 4], &buffer, 4).unwrap();
    guard.submit().unwrap();
    assert_eq!(device.buffer("b").unwrap().contents(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
}

#[test]
fn test_copy_overflow_is_rejected() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let buffer = device
        .create_buffer(BufferDesc { name: "b".into(), size: 2, usage: BufferUsage::Storage })
        .unwrap();
    assert!(headless(&chain).copy(&[1, 2, 3], &buffer, 0).is_err());
}

#[test]
fn test_copy_to_image_writes_the_leading_texels() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let staging = device
        .create_buffer(BufferDesc { name: "staging".into(), size: 8, usage: BufferUsage::Staging })
        .unwrap();
    let image = device
        .create_image(ImageDesc { name: "img".into(), extent: PhysicalSize::new(3, 1), format: ImageFormat::Rg8 })
        .unwrap();

    let mut guard = headless(&chain);
    guard.copy(&[1, 2, 3, 4, 5, 6, 7, 8], &staging, 0).unwrap();
    guard.copy_to_image(&staging, &image).unwrap();
    guard.submit().unwrap();

    let written = device.image("img").unwrap();
    assert_eq!(written.contents(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(written.write_count(), 1);
    assert_eq!(device.stats().image_copies, 1);
}

#[test]
fn test_copy_to_image_from_short_buffer_is_rejected() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let staging = device
        .create_buffer(BufferDesc { name: "staging".into(), size: 2, usage: BufferUsage::Staging })
        .unwrap();
    let image = device
        .create_image(ImageDesc { name: "img".into(), extent: PhysicalSize::new(2, 2), format: ImageFormat::R8 })
        .unwrap();
    assert!(headless(&chain).copy_to_image(&staging, &image).is_err());
    assert_eq!(device.image("img").unwrap().write_count(), 0);
}

// ============================================================================
// COMBINE AND PRESENT
// ============================================================================

#[test]
fn test_combine_appends_child_recording_in_call_order() {
    let device = HeadlessDevice::default();
    let parent = device.create_chain(ChainDesc::transfer("parent")).unwrap();
    let first = device.create_chain(ChainDesc::transfer("first")).unwrap();
    let second = device.create_chain(ChainDesc::transfer("second")).unwrap();
    for (chain, count) in [(&first, 3), (&second, 6)] {
        let mut guard = headless(chain);
        guard.begin().unwrap();
        guard.draw(count).unwrap();
        guard.end().unwrap();
    }

    let mut guard = headless(&parent);
    guard.begin().unwrap();
    guard.combine(&*headless(&second)).unwrap();
    guard.combine(&*headless(&first)).unwrap();
    guard.end().unwrap();

    let recorded = guard.as_any().downcast_ref::<HeadlessChain>().unwrap().recorded().to_vec();
    let children: Vec<&str> = recorded
        .iter()
        .filter_map(|c| match c {
            Command::Combine { child, .. } => Some(child.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(children, vec!["second", "first"]);
}

#[test]
fn test_present_requires_submitted_chain_and_reports_loss() {
    let device = HeadlessDevice::default();
    let pass = device.create_render_pass(pass_desc("main")).unwrap();
    let chain = device.create_chain(ChainDesc::graphics("main", pass.clone(), 0)).unwrap();
    let mut chain = headless(&chain);

    assert!(pass.lock().unwrap().present(&mut *chain).is_err());

    chain.begin().unwrap();
    chain.end().unwrap();
    chain.submit().unwrap();
    assert_eq!(pass.lock().unwrap().present(&mut *chain).unwrap(), PresentStatus::Presented);

    device.lose_surface();
    assert_eq!(pass.lock().unwrap().present(&mut *chain).unwrap(), PresentStatus::SurfaceLost);
    // Loss is reported once.
    assert_eq!(pass.lock().unwrap().present(&mut *chain).unwrap(), PresentStatus::Presented);
    assert_eq!(device.stats().presents, 2);
}

// ============================================================================
// FACTORY VALIDATION
// ============================================================================

#[test]
fn test_factory_rejects_empty_objects() {
    let device = HeadlessDevice::default();
    assert!(device.create_buffer(BufferDesc { name: "z".into(), size: 0, usage: BufferUsage::Uniform }).is_err());
    let mut desc = pass_desc("p");
    desc.subpasses.clear();
    assert!(device.create_render_pass(desc).is_err());
    assert!(device
        .create_pipeline(PipelineDesc { name: "g".into(), kind: PipelineKind::Graphics, shader: vec![1], pass: None })
        .is_err());
    assert!(device
        .create_pipeline(PipelineDesc { name: "c".into(), kind: PipelineKind::Compute, shader: Vec::new(), pass: None })
        .is_err());
}

#[test]
fn test_lookup_by_name_returns_latest_live_object() {
    let device = HeadlessDevice::default();
    let old = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let new = device.create_chain(ChainDesc::transfer("c")).unwrap();
    headless(&new).advance().unwrap();
    assert_eq!(device.chain("c").unwrap().lock().unwrap().advance_count(), 1);
    drop(new);
    assert_eq!(device.chain("c").unwrap().lock().unwrap().advance_count(), 0);
    drop(old);
    assert!(device.chain("c").is_none());
    assert_eq!(device.stats().chains_created, 2);
}

// ============================================================================
// CHAIN CYCLE
// ============================================================================

#[test]
fn test_cycle_records_when_dirty() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let mut guard = headless(&chain);
    let outcome = ChainCycle::record_or_advance(&mut *guard, true, |chain| chain.draw(6)).unwrap();
    assert_eq!(outcome, CycleOutcome::Recorded);
    assert_eq!(guard.state(), ChainState::Idle);
    assert_eq!(guard.ring_index(), 0);
}

#[test]
fn test_cycle_advances_ring_when_clean() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let mut guard = headless(&chain);
    let outcome = ChainCycle::record_or_advance(&mut *guard, false, |_| panic!("must not record")).unwrap();
    assert_eq!(outcome, CycleOutcome::Advanced);
    assert_eq!(guard.ring_index(), 1);
}

#[test]
fn test_cycle_propagates_recording_errors() {
    let device = HeadlessDevice::default();
    let chain = device.create_chain(ChainDesc::transfer("c")).unwrap();
    let mut guard = headless(&chain);
    let result = ChainCycle::record_or_advance(&mut *guard, true, |_| {
        Err(Error::BackendError("pipeline missing".into()))
    });
    assert!(result.is_err());
    assert_eq!(guard.state(), ChainState::Recording);
}
