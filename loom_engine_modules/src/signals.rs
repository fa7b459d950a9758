//! Payloads exchanged between the built-in modules

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use loom_engine::loom::gpu::{ChainLink, PassLink};

/// What a render pass hands the child recording into one of its subpasses
#[derive(Debug, Clone)]
pub struct PassTarget {
    pub chain: ChainLink,
    pub pass: PassLink,
    pub subpass: u32,
}

impl PassTarget {
    /// Both parent objects still exist
    pub fn is_alive(&self) -> bool {
        self.chain.is_alive() && self.pass.is_alive()
    }
}

/// Broadcast by a render pass that lost its surface
///
/// Receivers drop their parent links and wait for a fresh [`PassTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recreate {
    /// Generation of the pass objects that were lost
    pub generation: u64,
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

/// A drawable placed under a caller-chosen id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: String,
    /// Model or texture id resolved through the asset brokers
    pub asset: String,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl Placement {
    pub fn new(id: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            asset: asset.into(),
            position: [0.0; 3],
            scale: unit_scale(),
        }
    }

    pub fn at(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }

    pub fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from(self.scale),
            Quat::IDENTITY,
            Vec3::from(self.position),
        )
    }
}

/// New transform for an already placed drawable
#[derive(Debug, Clone, PartialEq)]
pub struct TransformUpdate {
    pub id: String,
    pub matrix: Mat4,
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
