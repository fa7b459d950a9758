/// Host-side aggregate mirrored into one device buffer

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use crate::engine_debug;
use crate::error::Result;
use crate::gpu::{Buffer, BufferDesc, BufferUsage, Chain, Device};

/// Extra elements reserved when a write lands past the current capacity
pub const GROWTH_HEADROOM: usize = 1024;

/// Dirty-tracked mirror of a `Vec<T>` in device memory
///
/// Setters only touch the host copy and mark it dirty. [`DeviceMirror::sync`]
/// issues a single copy of the whole aggregate, so any number of writes within
/// one frame cost one transfer and the last write wins.
pub struct DeviceMirror<T: Pod> {
    label: String,
    usage: BufferUsage,
    host: Vec<T>,
    capacity: usize,
    headroom: usize,
    buffer: Option<Arc<dyn Buffer>>,
    dirty: bool,
    reallocated: bool,
    synchronize: bool,
}

impl<T: Pod> DeviceMirror<T> {
    pub fn new(label: impl Into<String>, usage: BufferUsage) -> Self {
        Self {
            label: label.into(),
            usage,
            host: Vec::new(),
            capacity: 0,
            headroom: GROWTH_HEADROOM,
            buffer: None,
            dirty: false,
            reallocated: false,
            synchronize: true,
        }
    }

    /// Override the growth headroom (in elements)
    pub fn with_headroom(mut self, headroom: usize) -> Self {
        self.headroom = headroom;
        self
    }

    /// Whether `sync` waits for the copy to complete
    pub fn with_synchronize(mut self, synchronize: bool) -> Self {
        self.synchronize = synchronize;
        self
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    /// Elements the device buffer holds (or will hold once synchronized)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn as_slice(&self) -> &[T] {
        &self.host
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.host.get(index)
    }

    pub fn buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.buffer.as_ref()
    }

    /// Write one element, growing the aggregate if needed
    pub fn set(&mut self, index: usize, value: T) {
        if index >= self.host.len() {
            self.host.resize(index + 1, T::zeroed());
        }
        self.host[index] = value;
        self.reserve(index + 1);
        self.dirty = true;
    }

    /// Append one element and return its index
    pub fn push(&mut self, value: T) -> usize {
        let index = self.host.len();
        self.set(index, value);
        index
    }

    /// Replace the whole aggregate
    pub fn replace(&mut self, values: &[T]) {
        self.host.clear();
        self.host.extend_from_slice(values);
        self.reserve(values.len());
        self.dirty = true;
    }

    /// Shrink the host copy; the device buffer keeps its capacity
    pub fn truncate(&mut self, len: usize) {
        if len < self.host.len() {
            self.host.truncate(len);
            self.dirty = true;
        }
    }

    /// Force the next `sync` to copy
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Report and clear whether the device buffer was recreated by the last `sync`
    ///
    /// Pipelines holding the old buffer must rebind when this returns true.
    pub fn take_reallocated(&mut self) -> bool {
        std::mem::take(&mut self.reallocated)
    }

    fn reserve(&mut self, required: usize) {
        if required > self.capacity {
            let grown = required.saturating_sub(1) + self.headroom.max(1);
            engine_debug!(
                "loom::DeviceMirror",
                "[{}] growing capacity {} -> {} elements",
                self.label, self.capacity, grown
            );
            self.capacity = grown;
            self.buffer = None;
        }
    }

    /// Copy the host aggregate to the device if it changed
    ///
    /// Issues exactly one copy and one submit (followed by a synchronize unless
    /// disabled) and returns true, or returns false without touching the chain.
    pub fn sync(&mut self, device: &dyn Device, chain: &mut dyn Chain) -> Result<bool> {
        self.sync_then(device, chain, |_, _| Ok(()))
    }

    /// Like [`DeviceMirror::sync`], recording `then` after the copy and before
    /// the submit, so follow-up transfers out of the buffer land in the same
    /// submission
    pub fn sync_then<F>(&mut self, device: &dyn Device, chain: &mut dyn Chain, then: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Chain, &Arc<dyn Buffer>) -> Result<()>,
    {
        if !self.dirty {
            return Ok(false);
        }
        if self.host.is_empty() {
            self.dirty = false;
            return Ok(false);
        }

        if self.buffer.is_none() {
            let element = std::mem::size_of::<T>().max(1);
            let buffer = device.create_buffer(BufferDesc {
                name: self.label.clone(),
                size: (self.capacity * element) as u64,
                usage: self.usage,
            })?;
            self.buffer = Some(buffer);
            self.reallocated = true;
        }

        if let Some(buffer) = &self.buffer {
            chain.copy(bytemuck::cast_slice(&self.host), buffer, 0)?;
            then(chain, buffer)?;
            chain.submit()?;
            if self.synchronize {
                chain.synchronize()?;
            }
        }
        self.dirty = false;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "mirror_tests.rs"]
mod tests;
