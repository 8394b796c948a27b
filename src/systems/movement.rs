//! Seek steering toward the input target.
//!
//! One primitive, [`steer`], with two adapters: the store-bound
//! [`MovementSystem::update_entity`] and the plain-struct
//! [`MovementSystem::apply`]. Both resolve config the same way so they clamp
//! identically.

use anyhow::Result;

use crate::{
    config::EngineDefaults,
    ecs::{EntityIndex, World},
    engine::{System, SystemContext},
    rng::SystemRng,
};

use super::physics::{Body, PhysicsSystem};

/// Squared distance below which an entity stops steering.
pub const DEADZONE_SQ: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteeringTarget {
    pub x: f32,
    pub y: f32,
}

/// Plain-struct mirror of the movement fields of the config store.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MovementConfig {
    pub max_speed: f32,
    pub speed_multiplier: f32,
}

impl MovementConfig {
    pub fn read(world: &World, id: EntityIndex) -> Self {
        Self {
            max_speed: world.config.max_speed(id),
            speed_multiplier: world.config.speed_multiplier(id),
        }
    }
}

/// `max(configured, default) * multiplier`; an unset multiplier counts as 1.
pub fn effective_max_speed(config: &MovementConfig, defaults: &EngineDefaults) -> f32 {
    let multiplier = EngineDefaults::resolve(config.speed_multiplier, defaults.speed_multiplier);
    config.max_speed.max(defaults.max_speed) * multiplier
}

/// Accelerate `body` toward `(target_x, target_y)` and clamp its speed.
pub fn steer(
    body: &mut Body,
    target_x: f32,
    target_y: f32,
    acceleration: f32,
    max_speed: f32,
    dt: f32,
) {
    let dx = target_x - body.x;
    let dy = target_y - body.y;
    let dist_sq = dx * dx + dy * dy;
    if dist_sq < DEADZONE_SQ {
        return;
    }

    let dist = dist_sq.sqrt();
    body.vx += dx / dist * acceleration * dt;
    body.vy += dy / dist * acceleration * dt;

    let speed_sq = body.vx * body.vx + body.vy * body.vy;
    if speed_sq > max_speed * max_speed {
        let scale = max_speed / speed_sq.sqrt();
        body.vx *= scale;
        body.vy *= scale;
    }
}

pub struct MovementSystem;

impl MovementSystem {
    pub fn new() -> Self {
        Self
    }

    /// Steer every active player, bot and boss the room does not step itself.
    pub fn update(world: &mut World, defaults: &EngineDefaults, dt: f32) {
        for id in 0..world.capacity() {
            let flags = world.flags(id);
            if flags.is_alive() && flags.is_steerable() && !flags.is_input_driven() {
                Self::update_entity(world, id, defaults, dt);
            }
        }
    }

    /// Store-bound adapter.
    pub fn update_entity(world: &mut World, id: EntityIndex, defaults: &EngineDefaults, dt: f32) {
        let (target_x, target_y) = world.input.target(id);
        let target = SteeringTarget {
            x: target_x,
            y: target_y,
        };
        let config = MovementConfig::read(world, id);
        let mut body = Body::read(world, id);
        Self::apply(&mut body, &target, &config, defaults, dt);
        world.physics.set_velocity(id, body.vx, body.vy);
    }

    /// One client input: retarget, steer, integrate. Local prediction and the
    /// room's per-input application both go through here, so an acknowledged
    /// seq names the same state on both ends.
    pub fn step_input(
        world: &mut World,
        id: EntityIndex,
        target: SteeringTarget,
        map_radius: f32,
        defaults: &EngineDefaults,
        dt: f32,
    ) {
        world.input.set_target(id, target.x, target.y);
        Self::update_entity(world, id, defaults, dt);
        PhysicsSystem::update_entity(world, id, map_radius, defaults, dt);
    }

    /// Plain-struct adapter for callers without a world.
    pub fn apply(
        body: &mut Body,
        target: &SteeringTarget,
        config: &MovementConfig,
        defaults: &EngineDefaults,
        dt: f32,
    ) {
        let max_speed = effective_max_speed(config, defaults);
        steer(body, target.x, target.y, defaults.acceleration, max_speed, dt);
    }
}

impl Default for MovementSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for MovementSystem {
    fn name(&self) -> &str {
        "movement"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        Self::update(world, ctx.defaults, ctx.dt);
        Ok(())
    }
}
