mod bot;
mod collision;
pub mod movement;
pub mod physics;
mod projectile;
pub mod skill;
pub mod vfx;

pub use bot::{wander_target, BotSystem};
pub use collision::{CollisionStats, CollisionSystem};
pub use movement::{MovementConfig, MovementSystem, SteeringTarget};
pub use physics::{integrate, Body, PhysicsSystem, FIXED_DT};
pub use projectile::ProjectileSystem;
pub use skill::{spawn_projectile, SkillShape, SkillSystem};
pub use vfx::{VfxEvent, VfxKind, VfxQueue};
