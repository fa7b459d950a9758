/// Binarize - threshold an image into a two-level map

use std::sync::{Arc, Mutex};
use serde_json::Value;
use winit::dpi::PhysicalSize;
use loom_engine::bus::Requirement;
use loom_engine::config::value_f32;
use loom_engine::gpu::{Chain, Device, Image, Pipeline};
use loom_engine::loom::{ModuleContext, Result};
use loom_engine::engine_warn;
use crate::compute::image_processor::{work_groups, ComputeKind, ProcessorState};

pub const DEFAULT_THRESHOLD: f32 = 0.5;

pub struct BinarizeParams {
    /// Pushed to the shader before each dispatch
    pub threshold: f32,
}

impl Default for BinarizeParams {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

/// Ports: `::threshold` (number)
pub struct BinarizeKind;

impl ComputeKind for BinarizeKind {
    const TYPE_NAME: &'static str = "Binarize";
    const STAGES: &'static [&'static str] = &["binarize"];
    type Params = BinarizeParams;
    type Scratch = ();

    fn subscribe(ctx: &ModuleContext, state: &Arc<Mutex<ProcessorState<BinarizeParams>>>) {
        let source = ctx.port("threshold");
        ctx.bus().enroll_to(state, ctx.port("threshold"), Requirement::Optional, move |s: &mut ProcessorState<BinarizeParams>, v: &Value| {
            match value_f32(v) {
                Some(threshold) => s.params.threshold = threshold,
                None => engine_warn!("loom::Binarize", "'{}' expects a number, got {}", source, v),
            }
        });
    }

    fn build(_device: &dyn Device, _name: &str, _extent: PhysicalSize<u32>) -> Result<()> {
        Ok(())
    }

    fn bind(pipelines: &[Arc<dyn Pipeline>], input: &Arc<dyn Image>, output: &Arc<dyn Image>, _scratch: &()) -> Result<()> {
        for pipeline in pipelines {
            pipeline.bind_images("input_tex", std::slice::from_ref(input))?;
            pipeline.bind_images("output_tex", std::slice::from_ref(output))?;
        }
        Ok(())
    }

    fn record(
        chain: &mut dyn Chain,
        pipelines: &[Arc<dyn Pipeline>],
        params: &BinarizeParams,
        extent: PhysicalSize<u32>,
    ) -> Result<()> {
        let (x, y) = work_groups(extent);
        for pipeline in pipelines {
            chain.bind(pipeline)?;
            chain.push(bytemuck::bytes_of(&params.threshold))?;
            chain.dispatch(x, y, 1)?;
        }
        Ok(())
    }
}
