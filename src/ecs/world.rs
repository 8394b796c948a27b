//! World - central ECS container

use super::entity::EntityAllocator;
use super::{
    ComponentStore, ConfigStore, EntityFlags, EntityIndex, InputStore, PhysicsStore,
    ProjectileStore, SkillStore, StatsStore, TransformStore,
};
use crate::systems::vfx::{VfxQueue, DEFAULT_VFX_CAPACITY};

/// World holds the flags, the allocator and every component store for one
/// simulation. Pass it by reference into systems; there is no global state.
///
/// Store fields are public so systems can borrow several stores at once.
/// Reading a store at an index whose ACTIVE bit is clear is a contract
/// violation: the data there is whatever the last owner left behind.
pub struct World {
    tick: u64,
    flags: Vec<EntityFlags>,
    entities: EntityAllocator,
    pub transform: TransformStore,
    pub physics: PhysicsStore,
    pub stats: StatsStore,
    pub input: InputStore,
    pub config: ConfigStore,
    pub skill: SkillStore,
    pub projectile: ProjectileStore,
    pub vfx: VfxQueue,
}

impl World {
    pub fn new(capacity: usize) -> Self {
        Self {
            tick: 0,
            flags: vec![EntityFlags::NONE; capacity],
            entities: EntityAllocator::new(capacity),
            transform: TransformStore::new(capacity),
            physics: PhysicsStore::new(capacity),
            stats: StatsStore::new(capacity),
            input: InputStore::new(capacity),
            config: ConfigStore::new(capacity),
            skill: SkillStore::new(capacity),
            projectile: ProjectileStore::new(capacity),
            vfx: VfxQueue::new(DEFAULT_VFX_CAPACITY),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entities.capacity()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Reserve an index without activating it. The caller must write every
    /// store field it depends on, then set ACTIVE.
    pub fn allocate(&mut self) -> Option<EntityIndex> {
        let id = self.entities.allocate()?;
        self.flags[id] = EntityFlags::NONE;
        Some(id)
    }

    /// Allocate and immediately flag `ACTIVE | kind`. Store contents are stale
    /// from the previous owner until the caller overwrites them.
    pub fn spawn(&mut self, kind: EntityFlags) -> Option<EntityIndex> {
        let id = self.allocate()?;
        self.flags[id] = EntityFlags::ACTIVE | kind;
        Some(id)
    }

    /// Clear every flag and return the index to the free list.
    pub fn free(&mut self, id: EntityIndex) -> bool {
        if !self.entities.deallocate(id) {
            return false;
        }
        self.flags[id] = EntityFlags::NONE;
        true
    }

    pub fn mark_dead(&mut self, id: EntityIndex) {
        if self.flags[id].is_active() {
            self.flags[id].insert(EntityFlags::DEAD);
        }
    }

    /// Free every DEAD entity, appending the freed indices to `out`.
    pub fn reap_dead(&mut self, out: &mut Vec<EntityIndex>) {
        out.clear();
        for id in 0..self.capacity() {
            if self.flags[id].is_dead() && self.free(id) {
                out.push(id);
            }
        }
    }

    /// Zero every array and restore full capacity.
    pub fn reset(&mut self) {
        self.tick = 0;
        self.flags.fill(EntityFlags::NONE);
        self.entities.reset();
        let stores: [&mut dyn ComponentStore; 6] = [
            &mut self.transform,
            &mut self.physics,
            &mut self.stats,
            &mut self.config,
            &mut self.skill,
            &mut self.projectile,
        ];
        for store in stores {
            store.clear();
        }
        self.input.clear();
        self.vfx.clear();
    }

    pub fn flags(&self, id: EntityIndex) -> EntityFlags {
        self.flags[id]
    }

    pub fn set_flags(&mut self, id: EntityIndex, flags: EntityFlags) {
        self.flags[id] = flags;
    }

    pub fn insert_flags(&mut self, id: EntityIndex, flags: EntityFlags) {
        self.flags[id].insert(flags);
    }

    pub fn remove_flags(&mut self, id: EntityIndex, flags: EntityFlags) {
        self.flags[id].remove(flags);
    }

    pub fn is_active(&self, id: EntityIndex) -> bool {
        self.flags[id].is_active()
    }

    pub fn is_alive(&self, id: EntityIndex) -> bool {
        self.flags[id].is_alive()
    }

    pub fn is_dead(&self, id: EntityIndex) -> bool {
        self.flags[id].is_dead()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.count()
    }

    pub fn available(&self) -> usize {
        self.entities.available()
    }

    /// ACTIVE indices in ascending order.
    pub fn active_indices(&self) -> impl Iterator<Item = EntityIndex> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, flags)| flags.is_active())
            .map(|(id, _)| id)
    }

    pub fn count_matching(&self, kind: EntityFlags) -> usize {
        self.flags
            .iter()
            .filter(|flags| flags.is_alive() && flags.contains(kind))
            .count()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(super::DEFAULT_CAPACITY)
    }
}
