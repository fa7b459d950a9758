//! Unit tests for DeviceMirror
//!
//! Coalescing of writes, growth headroom and copy accounting against the
//! headless device.

use crate::gpu::headless::{HeadlessDevice, HeadlessChain};
use crate::gpu::{Buffer, BufferUsage, Chain, ChainDesc, Device};
use crate::resource::{DeviceMirror, GROWTH_HEADROOM};
use glam::Mat4;

fn chain_of(device: &HeadlessDevice, name: &str) -> crate::gpu::SharedChain {
    device.create_chain(ChainDesc::transfer(name)).unwrap()
}

#[test]
fn test_setters_never_copy() {
    let mut mirror: DeviceMirror<Mat4> = DeviceMirror::new("transforms", BufferUsage::Storage);
    mirror.set(0, Mat4::IDENTITY);
    mirror.set(1, Mat4::IDENTITY);
    assert!(mirror.is_dirty());
    assert!(mirror.buffer().is_none());
}

#[test]
fn test_many_writes_one_copy() {
    let device = HeadlessDevice::default();
    let chain = chain_of(&device, "upload");
    let mut mirror: DeviceMirror<u32> = DeviceMirror::new("values", BufferUsage::Storage);

    for value in 0..10u32 {
        mirror.set(3, value);
    }
    let copied = mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap();
    assert!(copied);
    assert!(!mirror.is_dirty());
    assert_eq!(device.stats().copies, 1);
    assert_eq!(device.stats().submits, 1);

    // Last write wins.
    let buffer = device.buffer("values").unwrap();
    let bytes = buffer.contents();
    let stored: Vec<u32> = bytes[..16]
        .chunks(4)
        .map(|chunk| u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    assert_eq!(stored, vec![0, 0, 0, 9]);
}

#[test]
fn test_clean_sync_does_not_touch_chain() {
    let device = HeadlessDevice::default();
    let chain = chain_of(&device, "upload");
    let mut mirror: DeviceMirror<u32> = DeviceMirror::new("values", BufferUsage::Storage);
    mirror.push(1);
    mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap();

    let copied = mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap();
    assert!(!copied);
    let guard = chain.lock().unwrap();
    let headless = guard.as_any().downcast_ref::<HeadlessChain>().unwrap();
    assert_eq!(headless.copy_count(), 1);
    assert_eq!(headless.submit_count(), 1);
}

#[test]
fn test_growth_reserves_headroom_and_reallocates() {
    let device = HeadlessDevice::default();
    let chain = chain_of(&device, "upload");
    let mut mirror: DeviceMirror<Mat4> = DeviceMirror::new("transforms", BufferUsage::Storage);

    mirror.set(0, Mat4::IDENTITY);
    assert_eq!(mirror.capacity(), GROWTH_HEADROOM);
    mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap();
    assert!(mirror.take_reallocated());
    assert!(!mirror.take_reallocated());

    let index = 5000;
    mirror.set(index, Mat4::from_translation(glam::Vec3::X));
    assert_eq!(mirror.capacity(), index + GROWTH_HEADROOM);
    assert!(mirror.is_dirty());
    mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap();
    assert!(mirror.take_reallocated());
    assert_eq!(device.stats().buffers_created, 2);

    let buffer = mirror.buffer().unwrap();
    assert_eq!(buffer.size(), ((index + GROWTH_HEADROOM) * std::mem::size_of::<Mat4>()) as u64);
}

#[test]
fn test_custom_headroom() {
    let mut mirror: DeviceMirror<u8> = DeviceMirror::new("staging", BufferUsage::Staging).with_headroom(10_000);
    mirror.replace(&[7; 64]);
    assert_eq!(mirror.capacity(), 63 + 10_000);
}

#[test]
fn test_empty_mirror_sync_clears_dirty_without_copy() {
    let device = HeadlessDevice::default();
    let chain = chain_of(&device, "upload");
    let mut mirror: DeviceMirror<u32> = DeviceMirror::new("values", BufferUsage::Storage);
    mirror.mark_dirty();
    assert!(!mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap());
    assert!(!mirror.is_dirty());
    assert_eq!(device.stats().copies, 0);
}

#[test]
fn test_truncate_marks_dirty() {
    let mut mirror: DeviceMirror<u32> = DeviceMirror::new("values", BufferUsage::Storage);
    mirror.replace(&[1, 2, 3]);
    let device = HeadlessDevice::default();
    let chain = chain_of(&device, "upload");
    mirror.sync(&device, &mut *chain.lock().unwrap()).unwrap();
    mirror.truncate(1);
    assert!(mirror.is_dirty());
    assert_eq!(mirror.as_slice(), &[1]);
    mirror.truncate(5);
    assert_eq!(mirror.len(), 1);
}
