use rustc_hash::FxHashMap;

/// Stable `usize` slots for string-keyed entries
///
/// Drawables are addressed by id on the bus but by index in device buffers.
/// The pool hands each id a slot, recycles the slots of removed ids, and
/// tracks the high-water mark the device buffer has to cover.
///
/// ```ignore
/// let mut pool = SlotPool::new();
/// let a = pool.acquire("tree");   // 0
/// let b = pool.acquire("rock");   // 1
/// pool.release("tree");           // 0 is free again
/// let c = pool.acquire("bush");   // 0 (recycled)
/// ```
#[derive(Debug, Default, Clone)]
pub struct SlotPool {
    slots: FxHashMap<String, usize>,
    free_list: Vec<usize>,
    next: usize,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `id`, allocating one if it has none
    pub fn acquire(&mut self, id: &str) -> usize {
        if let Some(&slot) = self.slots.get(id) {
            return slot;
        }
        let slot = self.free_list.pop().unwrap_or_else(|| {
            let slot = self.next;
            self.next += 1;
            slot
        });
        self.slots.insert(id.to_string(), slot);
        slot
    }

    /// Free the slot of `id`, returning it
    pub fn release(&mut self, id: &str) -> Option<usize> {
        let slot = self.slots.remove(id)?;
        self.free_list.push(slot);
        Some(slot)
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.slots.get(id).copied()
    }

    /// Highest slot ever handed out + 1
    pub fn high_water_mark(&self) -> usize {
        self.next
    }

    /// Live ids
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Live `(id, slot)` pairs sorted by slot
    pub fn entries(&self) -> Vec<(&str, usize)> {
        let mut entries: Vec<(&str, usize)> = self.slots.iter().map(|(id, slot)| (id.as_str(), *slot)).collect();
        entries.sort_by_key(|(_, slot)| *slot);
        entries
    }
}

#[cfg(test)]
#[path = "slot_pool_tests.rs"]
mod tests;
