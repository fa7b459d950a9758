use bitflags::bitflags;

bitflags! {
    /// Which host-side aggregates changed since the last synchronization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        /// Per-instance transforms
        const TRANSFORMS = 1 << 0;
        /// Set of drawables (added, removed, or loaded)
        const DRAWABLES  = 1 << 1;
        /// View matrix
        const CAMERA     = 1 << 2;
        /// Projection matrix
        const PROJECTION = 1 << 3;
        /// Bound textures
        const TEXTURES   = 1 << 4;
        /// Per-instance metadata (sprite rects, tints)
        const METADATA   = 1 << 5;
        /// Host image bytes
        const PIXELS     = 1 << 6;
    }
}

impl DirtyFlags {
    /// Clear `flags` and report whether any of them were set
    pub fn take(&mut self, flags: DirtyFlags) -> bool {
        let hit = self.intersects(flags);
        self.remove(flags);
        hit
    }
}
