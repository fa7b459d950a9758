/// Connected components - label the regions of a binary map
///
/// Three stages share an index map with one `u32` per texel: a local
/// union-find per work group, a boundary merge run twice, and a global pass
/// writing the labels into the output image.

use std::sync::Arc;
use winit::dpi::PhysicalSize;
use loom_engine::gpu::{Buffer, BufferDesc, BufferUsage, Chain, Device, Image, Pipeline};
use loom_engine::loom::Result;
use loom_engine::engine_bail;
use crate::compute::image_processor::{work_groups, ComputeKind};

const LOCAL: usize = 0;
const BOUNDARY: usize = 1;
const GLOBAL: usize = 2;

/// Boundary merges per run
const BOUNDARY_PASSES: usize = 2;

pub struct ConnectedComponentsKind;

impl ConnectedComponentsKind {
    fn stages(pipelines: &[Arc<dyn Pipeline>]) -> Result<[&Arc<dyn Pipeline>; 3]> {
        match pipelines {
            [local, boundary, global] => Ok([local, boundary, global]),
            _ => engine_bail!("loom::ConnectedComponents", "expected 3 stage pipelines, got {}", pipelines.len()),
        }
    }
}

impl ComputeKind for ConnectedComponentsKind {
    const TYPE_NAME: &'static str = "ConnectedComponents";
    const STAGES: &'static [&'static str] = &["local", "boundary", "global"];
    type Params = ();
    /// Index map
    type Scratch = Arc<dyn Buffer>;

    fn build(device: &dyn Device, name: &str, extent: PhysicalSize<u32>) -> Result<Arc<dyn Buffer>> {
        let texels = extent.width as u64 * extent.height as u64;
        device.create_buffer(BufferDesc {
            name: format!("{}::indices", name),
            size: texels * std::mem::size_of::<u32>() as u64,
            usage: BufferUsage::Storage,
        })
    }

    fn bind(
        pipelines: &[Arc<dyn Pipeline>],
        input: &Arc<dyn Image>,
        output: &Arc<dyn Image>,
        indices: &Arc<dyn Buffer>,
    ) -> Result<()> {
        let stages = Self::stages(pipelines)?;
        for stage in [stages[LOCAL], stages[BOUNDARY]] {
            stage.bind_images("input_tex", std::slice::from_ref(input))?;
            stage.bind_buffer("index_map", indices)?;
        }
        stages[GLOBAL].bind_buffer("index_map", indices)?;
        stages[GLOBAL].bind_images("output_tex", std::slice::from_ref(output))?;
        Ok(())
    }

    fn record(chain: &mut dyn Chain, pipelines: &[Arc<dyn Pipeline>], _params: &(), extent: PhysicalSize<u32>) -> Result<()> {
        let stages = Self::stages(pipelines)?;
        let (x, y) = work_groups(extent);
        let width = bytemuck::bytes_of(&extent.width);

        chain.bind(stages[LOCAL])?;
        chain.push(width)?;
        chain.dispatch(x, y, 1)?;

        chain.bind(stages[BOUNDARY])?;
        for _ in 0..BOUNDARY_PASSES {
            chain.push(width)?;
            chain.dispatch(x, y, 1)?;
        }

        chain.bind(stages[GLOBAL])?;
        chain.push(width)?;
        chain.dispatch(x, y, 1)?;
        Ok(())
    }
}
