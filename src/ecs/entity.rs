//! Entity index allocation

/// Entity handle: a plain index into every component store.
pub type EntityIndex = usize;

/// Default world capacity.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Fixed-capacity free-list allocator.
///
/// Indices are handed out lowest-first and freed indices are reused LIFO.
/// Running out of indices is reported as `None`, never by recycling a live slot.
pub struct EntityAllocator {
    capacity: usize,
    free_list: Vec<EntityIndex>,
    alive: Vec<bool>,
    count: usize,
}

impl EntityAllocator {
    pub fn new(capacity: usize) -> Self {
        let mut allocator = Self {
            capacity,
            free_list: Vec::with_capacity(capacity),
            alive: vec![false; capacity],
            count: 0,
        };
        allocator.reset();
        allocator
    }

    /// Release every index and restore full capacity.
    pub fn reset(&mut self) {
        self.free_list.clear();
        self.free_list.extend((0..self.capacity).rev());
        self.alive.fill(false);
        self.count = 0;
    }

    pub fn allocate(&mut self) -> Option<EntityIndex> {
        let id = self.free_list.pop()?;
        self.alive[id] = true;
        self.count += 1;
        Some(id)
    }

    /// Returns `false` when `id` was not allocated, so a double free cannot
    /// put the same index on the free list twice.
    pub fn deallocate(&mut self, id: EntityIndex) -> bool {
        match self.alive.get_mut(id) {
            Some(alive) if *alive => {
                *alive = false;
                self.free_list.push(id);
                self.count -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn is_alive(&self, id: EntityIndex) -> bool {
        self.alive.get(id).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.free_list.len()
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
