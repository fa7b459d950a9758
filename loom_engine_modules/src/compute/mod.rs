//! Image-processing modules
//!
//! [`ImageProcessor`] owns the compute chain, one pipeline per stage and the
//! output image sized after the input. A [`ComputeKind`] supplies its stages,
//! their bindings and the dispatches of one run.

mod image_processor;
mod binarize;
mod connected_components;

pub use image_processor::{work_groups, ComputeKind, ImageProcessor, ProcessorState, WORK_GROUP_SIZE};
pub use binarize::{BinarizeKind, BinarizeParams, DEFAULT_THRESHOLD};
pub use connected_components::ConnectedComponentsKind;

/// Thresholds an image into a two-level map
pub type Binarize = ImageProcessor<BinarizeKind>;

/// Labels the connected regions of a binary map
pub type ConnectedComponents = ImageProcessor<ConnectedComponentsKind>;
