//! Archetype constructors. Each writes every store before setting the flags,
//! so systems never see a half-initialized entity.

use rand::Rng;

use crate::{
    ecs::{EntityFlags, EntityIndex, World},
    systems::{wander_target, SkillShape},
};

pub const PLAYER_RADIUS: f32 = 20.0;
pub const PLAYER_HEALTH: f32 = 100.0;
pub const BOT_RADIUS: f32 = 18.0;
pub const BOT_HEALTH: f32 = 60.0;
pub const FOOD_RADIUS: f32 = 5.0;
pub const FOOD_VALUE: f32 = 1.0;
pub const FOOD_FRICTION: f32 = 0.9;

/// Spawn points stay inside this share of the arena radius.
const SPAWN_FRACTION: f32 = 0.8;

#[allow(clippy::too_many_arguments)]
fn init_common(
    world: &mut World,
    id: EntityIndex,
    x: f32,
    y: f32,
    radius: f32,
    friction: f32,
    health: f32,
    score: f32,
) {
    world.transform.set(id, x, y, 0.0, 1.0);
    world.physics.set(id, 0.0, 0.0, 1.0, radius, friction);
    world.stats.set(id, health, health, score, 0.0);
    world.config.clear_entity(id);
    world.input.set(id, x, y, 0);
    world.input.set_last_seq(id, 0);
    world.skill.set(id, 0.0, 0.0, 0);
    world.projectile.set(id, id, 0.0, 0.0);
}

pub fn spawn_player(world: &mut World, x: f32, y: f32, shape: SkillShape) -> Option<EntityIndex> {
    let id = world.allocate()?;
    init_common(world, id, x, y, PLAYER_RADIUS, 0.0, PLAYER_HEALTH, 0.0);
    world.skill.set(id, 0.0, 0.0, shape as u8);
    world.set_flags(id, EntityFlags::ACTIVE | EntityFlags::PLAYER);
    Some(id)
}

pub fn spawn_bot(world: &mut World, x: f32, y: f32, shape: SkillShape) -> Option<EntityIndex> {
    let id = world.allocate()?;
    init_common(world, id, x, y, BOT_RADIUS, 0.0, BOT_HEALTH, 0.0);
    world.skill.set(id, 0.0, 0.0, shape as u8);
    world.set_flags(id, EntityFlags::ACTIVE | EntityFlags::BOT);
    Some(id)
}

pub fn spawn_food(world: &mut World, x: f32, y: f32) -> Option<EntityIndex> {
    let id = world.allocate()?;
    init_common(world, id, x, y, FOOD_RADIUS, FOOD_FRICTION, 1.0, FOOD_VALUE);
    world.set_flags(id, EntityFlags::ACTIVE | EntityFlags::FOOD);
    Some(id)
}

/// Random spawn point for an arena of `map_radius`.
pub fn spawn_point(rng: &mut impl Rng, map_radius: f32) -> (f32, f32) {
    wander_target(rng, map_radius * SPAWN_FRACTION)
}

pub fn random_shape(rng: &mut impl Rng) -> SkillShape {
    SkillShape::from_raw(rng.gen_range(0..4u8) as f32)
}
