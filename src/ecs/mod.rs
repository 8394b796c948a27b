//! Entity Component System (ECS) implementation
//!
//! Fixed-capacity, data-oriented store: entities are plain indices, components
//! are strided `f32` arrays, and liveness is a per-index bitmask.

pub mod component;
pub mod entity;
pub mod flags;
pub mod world;

pub use component::{
    actions, ComponentStore, ConfigStore, InputStore, PhysicsStore, ProjectileStore, SkillStore,
    StatsStore, TransformStore,
};
pub use entity::{EntityAllocator, EntityIndex, DEFAULT_CAPACITY};
pub use flags::EntityFlags;
pub use world::World;
