//! Velocity integration with friction and a circular arena boundary.

use anyhow::Result;

use crate::{
    config::EngineDefaults,
    ecs::{EntityIndex, World},
    engine::{System, SystemContext},
    rng::SystemRng,
};

/// Step length the friction fast path is tuned for.
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// Velocity units to world units per second.
pub const UNIT_SCALE: f32 = 10.0;

/// Share of the outward normal velocity removed on boundary contact.
pub const BOUNCE_FACTOR: f32 = 1.5;

const FAST_PATH_EPSILON: f32 = 1e-6;

/// Kinematic state shared by the server step and client replay.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Body {
    pub fn new(x: f32, y: f32, vx: f32, vy: f32) -> Self {
        Self { x, y, vx, vy }
    }

    pub fn read(world: &World, id: EntityIndex) -> Self {
        let (x, y) = world.transform.position(id);
        let (vx, vy) = world.physics.velocity(id);
        Self { x, y, vx, vy }
    }

    /// Write position and velocity back; prev position is left alone.
    pub fn write(&self, world: &mut World, id: EntityIndex) {
        world.transform.set_position(id, self.x, self.y);
        world.physics.set_velocity(id, self.vx, self.vy);
    }

    pub fn speed(&self) -> f32 {
        (self.vx * self.vx + self.vy * self.vy).sqrt()
    }

    pub fn distance_to(&self, other: &Body) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Per-step velocity multiplier, `friction^(dt*60)`.
///
/// At the nominal 60 Hz step the exponent is one and `powf` is skipped. Other
/// step lengths use the exact power; this rescales damping, it does not
/// sub-step.
pub fn damping(friction: f32, dt: f32) -> f32 {
    if (dt - FIXED_DT).abs() < FAST_PATH_EPSILON {
        friction
    } else {
        friction.powf(dt * 60.0)
    }
}

/// Integrate one step: damp, move, then clamp to the arena and bounce.
///
/// `map_radius - radius` is floored at zero, so an entity wider than the
/// arena is pinned to the center.
pub fn integrate(body: &mut Body, friction: f32, radius: f32, map_radius: f32, dt: f32) {
    let damp = damping(friction, dt);
    body.vx *= damp;
    body.vy *= damp;

    body.x += body.vx * dt * UNIT_SCALE;
    body.y += body.vy * dt * UNIT_SCALE;

    let limit = (map_radius - radius).max(0.0);
    let dist_sq = body.x * body.x + body.y * body.y;
    if dist_sq > limit * limit {
        let dist = dist_sq.sqrt();
        let nx = body.x / dist;
        let ny = body.y / dist;
        body.x = nx * limit;
        body.y = ny * limit;

        let outward = body.vx * nx + body.vy * ny;
        if outward > 0.0 {
            body.vx -= BOUNCE_FACTOR * outward * nx;
            body.vy -= BOUNCE_FACTOR * outward * ny;
        }
    }
}

pub struct PhysicsSystem;

impl PhysicsSystem {
    pub fn new() -> Self {
        Self
    }

    /// Integrate every active entity except input-driven ones.
    pub fn update(world: &mut World, map_radius: f32, defaults: &EngineDefaults, dt: f32) {
        for id in 0..world.capacity() {
            let flags = world.flags(id);
            if flags.is_active() && !flags.is_input_driven() {
                Self::update_entity(world, id, map_radius, defaults, dt);
            }
        }
    }

    /// Integrate one entity from the stores, recording its previous position.
    pub fn update_entity(
        world: &mut World,
        id: EntityIndex,
        map_radius: f32,
        defaults: &EngineDefaults,
        dt: f32,
    ) {
        let mut body = Body::read(world, id);
        let friction = EngineDefaults::resolve(world.physics.friction(id), defaults.friction);
        let radius = world.physics.radius(id);

        world.transform.set_prev_x(id, body.x);
        world.transform.set_prev_y(id, body.y);
        integrate(&mut body, friction, radius, map_radius, dt);
        body.write(world, id);
    }
}

impl Default for PhysicsSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        Self::update(world, ctx.map_radius, ctx.defaults, ctx.dt);
        Ok(())
    }
}
