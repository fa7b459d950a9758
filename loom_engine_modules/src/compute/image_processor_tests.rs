use super::*;
use crate::compute::{Binarize, ConnectedComponents};
use loom_engine::bus::{ChannelId, SignalRouter};
use loom_engine::gpu::headless::{Command, HeadlessDevice};
use loom_engine::gpu::{BufferUsage, Buffer};
use serde_json::json;

struct Rig<M> {
    _router: SignalRouter,
    module: M,
    driver: Bus,
    device: Arc<HeadlessDevice>,
    links: Arc<Mutex<Vec<ImageLink>>>,
}

fn rig<M: Module>(mut module: M, name: &str, stages: usize) -> Rig<M> {
    let router = SignalRouter::new();
    let services = Services::default();
    let device = Arc::new(HeadlessDevice::default());
    services.devices.insert(DeviceId(0), device.clone());
    module.subscribe(&ModuleContext::new(name, router.bus(ChannelId(0)), services)).unwrap();

    let driver = router.bus(ChannelId(0));
    let links = Arc::new(Mutex::new(Vec::new()));
    driver.enroll_to(&links, "view::image", Requirement::Optional, |s: &mut Vec<ImageLink>, l: &ImageLink| s.push(l.clone()));
    driver.emit_value(&format!("{}::device", name), json!(0));
    driver.emit_value(&format!("{}::input", name), json!("src::image"));
    driver.emit_indexed(&format!("{}::outputs", name), json!("view::image"), 0);
    for stage in 0..stages {
        driver.emit_indexed(&format!("{}::shader_bytes", name), vec![stage as u8 + 1; 16], stage);
    }
    Rig { _router: router, module, driver, device, links }
}

fn source(device: &HeadlessDevice, width: u32, height: u32) -> Arc<dyn Image> {
    device
        .create_image(ImageDesc { name: "src".into(), extent: PhysicalSize::new(width, height), format: ImageFormat::R8 })
        .unwrap()
}

fn log(device: &HeadlessDevice, chain: &str) -> Vec<Command> {
    device.chain(chain).unwrap().lock().unwrap().log().to_vec()
}

#[test]
fn test_work_groups_round_partial_groups_up() {
    assert_eq!(work_groups(PhysicalSize::new(100, 50)), (4, 2));
    assert_eq!(work_groups(PhysicalSize::new(64, 32)), (2, 1));
    assert_eq!(work_groups(PhysicalSize::new(1, 1)), (1, 1));
}

#[test]
fn test_nothing_is_built_before_the_input_arrives() {
    let mut rig = rig(Binarize::new(), "bin", 1);
    rig.module.execute().unwrap();
    rig.module.execute().unwrap();

    assert!(!rig.module.gate().is_ready());
    assert_eq!(rig.device.stats().pipelines_created, 0);
    assert_eq!(rig.module.dispatched_frames(), 0);
    assert!(rig.links.lock().unwrap().is_empty());
}

#[test]
fn test_missing_shader_keeps_the_gate_closed() {
    let mut rig = rig(Binarize::new(), "bin", 0);
    let image = source(&rig.device, 64, 64);
    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();

    assert!(!rig.module.gate().is_ready());
    assert_eq!(rig.device.stats().chains_created, 0);
}

#[test]
fn test_input_frame_dispatches_the_whole_image() {
    let mut rig = rig(Binarize::new(), "bin", 1);
    rig.driver.emit_value("bin::threshold", json!(0.25));
    let image = source(&rig.device, 100, 50);
    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();

    assert_eq!(
        log(&rig.device, "bin::compute"),
        vec![
            Command::Begin { subpass: None },
            Command::Bind("bin::binarize".to_string()),
            Command::Push(4),
            Command::Dispatch { x: 4, y: 2, z: 1 },
            Command::End,
            Command::Submit,
            Command::Synchronize,
        ]
    );
    assert_eq!(rig.module.with_state(|s| s.params.threshold), 0.25);

    let pipeline = rig.device.pipeline("bin::binarize").unwrap();
    assert_eq!(pipeline.kind(), PipelineKind::Compute);
    assert_eq!(pipeline.bound_count("input_tex"), Some(1));
    assert_eq!(pipeline.bound_count("output_tex"), Some(1));

    let links = rig.links.lock().unwrap();
    assert_eq!(links.len(), 1);
    let output = links[0].upgrade().unwrap();
    assert_eq!(output.extent(), PhysicalSize::new(100, 50));
    assert_eq!(output.format(), ImageFormat::Rgba32f);
}

#[test]
fn test_frames_without_input_only_advance() {
    let mut rig = rig(Binarize::new(), "bin", 1);
    let image = source(&rig.device, 64, 64);
    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();
    rig.module.execute().unwrap();
    rig.module.execute().unwrap();

    assert_eq!(rig.module.dispatched_frames(), 1);
    assert_eq!(rig.module.advanced_frames(), 2);
    let chain = rig.device.chain("bin::compute").unwrap();
    assert_eq!(chain.lock().unwrap().dispatch_count(), 1);
    assert_eq!(chain.lock().unwrap().advance_count(), 2);
    assert_eq!(rig.links.lock().unwrap().len(), 1);

    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();
    assert_eq!(rig.module.dispatched_frames(), 2);
    assert_eq!(rig.module.gate().generation(), 1);
}

#[test]
fn test_reshaped_input_rebuilds_the_output() {
    let mut rig = rig(Binarize::new(), "bin", 1);
    let small = source(&rig.device, 32, 32);
    rig.driver.emit_value("src::image", Link::new(&small));
    rig.module.execute().unwrap();
    let large = source(&rig.device, 96, 64);
    rig.driver.emit_value("src::image", Link::new(&large));
    rig.module.execute().unwrap();

    assert_eq!(rig.module.gate().generation(), 2);
    let links = rig.links.lock().unwrap();
    assert!(!links[0].is_alive());
    assert_eq!(links[1].upgrade().unwrap().extent(), PhysicalSize::new(96, 64));
    assert!(log(&rig.device, "bin::compute").contains(&Command::Dispatch { x: 3, y: 2, z: 1 }));
}

#[test]
fn test_connected_components_runs_every_stage_in_order() {
    let mut rig = rig(ConnectedComponents::new(), "cc", 3);
    let image = source(&rig.device, 40, 40);
    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();

    let dispatch = Command::Dispatch { x: 2, y: 2, z: 1 };
    assert_eq!(
        log(&rig.device, "cc::compute"),
        vec![
            Command::Begin { subpass: None },
            Command::Bind("cc::local".to_string()),
            Command::Push(4),
            dispatch.clone(),
            Command::Bind("cc::boundary".to_string()),
            Command::Push(4),
            dispatch.clone(),
            Command::Push(4),
            dispatch.clone(),
            Command::Bind("cc::global".to_string()),
            Command::Push(4),
            dispatch,
            Command::End,
            Command::Submit,
            Command::Synchronize,
        ]
    );

    let indices = rig.device.buffer("cc::indices").unwrap();
    assert_eq!(indices.size(), 40 * 40 * 4);
    assert_eq!(indices.usage(), BufferUsage::Storage);
    assert_eq!(rig.device.pipeline("cc::global").unwrap().bound_count("output_tex"), Some(1));
    assert_eq!(rig.device.pipeline("cc::local").unwrap().bound_count("index_map"), Some(1));
    assert_eq!(rig.links.lock().unwrap().len(), 1);
}

#[test]
fn test_connected_components_waits_for_all_three_shaders() {
    let mut rig = rig(ConnectedComponents::new(), "cc", 2);
    let image = source(&rig.device, 40, 40);
    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();
    assert!(!rig.module.gate().is_ready());

    rig.driver.emit_indexed("cc::shader_bytes", vec![3u8; 16], 2);
    rig.driver.emit_value("src::image", Link::new(&image));
    rig.module.execute().unwrap();
    assert!(rig.module.gate().is_ready());
    assert_eq!(rig.device.stats().pipelines_created, 3);
}
