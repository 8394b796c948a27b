//! Cooldown-gated abilities.
//!
//! A cast needs an ACTIVE caster, a fresh skill bit and an expired cooldown.
//! The skill bit is consumed by the check itself, so a press that lands during
//! cooldown is lost rather than queued.
//!
//! Shockwaves push every live non-projectile neighbor away from the caster.
//! Candidates come from the grid built at the end of the previous tick and
//! are then tested against current positions.

use anyhow::Result;
use tracing::trace;

use crate::{
    config::EngineDefaults,
    ecs::{EntityFlags, EntityIndex, World},
    engine::{System, SystemContext},
    rng::SystemRng,
    spatial::SpatialGrid,
};

use super::{
    movement::{effective_max_speed, MovementConfig},
    vfx::{VfxEvent, VfxKind},
};

/// Below this speed a dash aims at the input target instead of the velocity.
const DASH_MIN_SPEED: f32 = 1e-3;

/// Scale of the impulse; a large shockwave pushes harder as well as wider.
const LARGE_SHOCKWAVE_FORCE: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SkillShape {
    Dash = 0,
    Shockwave = 1,
    Pierce = 2,
    LargeShockwave = 3,
}

impl SkillShape {
    /// Shape ids outside the known range fall back to a dash.
    pub fn from_raw(raw: f32) -> Self {
        match raw as u8 {
            1 => Self::Shockwave,
            2 => Self::Pierce,
            3 => Self::LargeShockwave,
            _ => Self::Dash,
        }
    }
}

pub struct SkillSystem {
    scratch: Vec<EntityIndex>,
}

impl SkillSystem {
    pub fn new() -> Self {
        Self {
            scratch: Vec::with_capacity(64),
        }
    }

    /// Tick every active cooldown down toward zero.
    pub fn update_cooldowns(world: &mut World, dt: f32) {
        for id in 0..world.capacity() {
            if !world.is_active(id) {
                continue;
            }
            let cooldown = world.skill.cooldown(id);
            if cooldown > 0.0 {
                world.skill.set_cooldown(id, (cooldown - dt).max(0.0));
            }
        }
    }

    /// Try to cast for `id`. Returns whether a skill fired.
    pub fn handle_input(
        &mut self,
        world: &mut World,
        grid: &SpatialGrid,
        id: EntityIndex,
        defaults: &EngineDefaults,
    ) -> bool {
        if !world.is_alive(id) {
            return false;
        }
        if !world.input.consume_skill_input(id) {
            return false;
        }
        if world.skill.cooldown(id) > 0.0 {
            return false;
        }

        let max_cooldown = EngineDefaults::resolve(world.skill.max_cooldown(id), defaults.skill_cooldown);
        world.skill.set_cooldown(id, max_cooldown);

        let shape = SkillShape::from_raw(world.skill.shape(id));
        trace!(entity = id, ?shape, "skill cast");
        match shape {
            SkillShape::Dash => Self::dash(world, id, defaults),
            SkillShape::Shockwave => self.shockwave(
                world,
                grid,
                id,
                VfxKind::Shockwave,
                defaults.shockwave_radius,
                defaults.shockwave_force,
            ),
            SkillShape::Pierce => Self::pierce(world, id, defaults),
            SkillShape::LargeShockwave => self.shockwave(
                world,
                grid,
                id,
                VfxKind::LargeShockwave,
                defaults.large_shockwave_radius,
                defaults.shockwave_force * LARGE_SHOCKWAVE_FORCE,
            ),
        }
        true
    }

    fn dash(world: &mut World, id: EntityIndex, defaults: &EngineDefaults) {
        let (x, y) = world.transform.position(id);
        let (vx, vy) = world.physics.velocity(id);
        let speed = (vx * vx + vy * vy).sqrt();

        let (dir_x, dir_y) = if speed > DASH_MIN_SPEED {
            (vx / speed, vy / speed)
        } else {
            let (tx, ty) = world.input.target(id);
            let (dx, dy) = (tx - x, ty - y);
            let dist = (dx * dx + dy * dy).sqrt();
            if dist > DASH_MIN_SPEED {
                (dx / dist, dy / dist)
            } else {
                (0.0, 0.0)
            }
        };

        let dash_speed =
            effective_max_speed(&MovementConfig::read(world, id), defaults) * defaults.dash_factor;
        world
            .physics
            .set_velocity(id, dir_x * dash_speed, dir_y * dash_speed);
        world.vfx.push(VfxEvent {
            kind: VfxKind::Dash,
            entity: id,
            x,
            y,
            value: dash_speed,
        });
    }

    fn shockwave(
        &mut self,
        world: &mut World,
        grid: &SpatialGrid,
        id: EntityIndex,
        kind: VfxKind,
        radius: f32,
        force: f32,
    ) {
        let (x, y) = world.transform.position(id);
        world.physics.set_velocity(id, 0.0, 0.0);

        grid.query_radius_into(x, y, radius, &mut self.scratch);
        self.scratch.sort_unstable();
        self.scratch.dedup();

        let mut pushed = 0;
        for &other in &self.scratch {
            let flags = world.flags(other);
            if other == id || !flags.is_alive() || flags.is_projectile() {
                continue;
            }
            let (ox, oy) = world.transform.position(other);
            let (dx, dy) = (ox - x, oy - y);
            let dist = (dx * dx + dy * dy).sqrt();
            let reach = radius + world.physics.radius(other);
            if dist > reach {
                continue;
            }
            let (nx, ny) = if dist > DASH_MIN_SPEED {
                (dx / dist, dy / dist)
            } else {
                (1.0, 0.0)
            };
            let strength = force * (1.0 - dist / reach);
            let (vx, vy) = world.physics.velocity(other);
            world
                .physics
                .set_velocity(other, vx + nx * strength, vy + ny * strength);
            pushed += 1;
        }
        trace!(entity = id, pushed, "shockwave");

        world.vfx.push(VfxEvent {
            kind,
            entity: id,
            x,
            y,
            value: radius,
        });
    }

    fn pierce(world: &mut World, id: EntityIndex, defaults: &EngineDefaults) {
        let (x, y) = world.transform.position(id);
        let spawned = spawn_projectile(world, id, defaults);
        world.vfx.push(VfxEvent {
            kind: VfxKind::Pierce,
            entity: id,
            x,
            y,
            value: spawned.map_or(-1.0, |p| p as f32),
        });
    }
}

/// Spawn a projectile from `owner`'s edge toward its input target.
///
/// Returns `None` when the world is full; the cast still counts.
pub fn spawn_projectile(
    world: &mut World,
    owner: EntityIndex,
    defaults: &EngineDefaults,
) -> Option<EntityIndex> {
    let (x, y) = world.transform.position(owner);
    let (tx, ty) = world.input.target(owner);
    let (dx, dy) = (tx - x, ty - y);
    let dist = (dx * dx + dy * dy).sqrt();
    let (dir_x, dir_y) = if dist > 1e-3 {
        (dx / dist, dy / dist)
    } else {
        let (vx, vy) = world.physics.velocity(owner);
        let speed = (vx * vx + vy * vy).sqrt();
        if speed > 1e-3 {
            (vx / speed, vy / speed)
        } else {
            (1.0, 0.0)
        }
    };

    let Some(id) = world.allocate() else {
        trace!(owner, "no room for projectile");
        return None;
    };
    let offset = world.physics.radius(owner) + defaults.projectile_radius;
    let px = x + dir_x * offset;
    let py = y + dir_y * offset;
    world.transform.set(id, px, py, dir_y.atan2(dir_x), 1.0);
    world.physics.set(
        id,
        dir_x * defaults.projectile_speed,
        dir_y * defaults.projectile_speed,
        0.1,
        defaults.projectile_radius,
        1.0,
    );
    world.stats.set(id, 1.0, 1.0, 0.0, 0.0);
    world.config.clear_entity(id);
    world.skill.set(id, 0.0, 0.0, 0);
    world.input.set(id, px, py, 0);
    world
        .projectile
        .set(id, owner, defaults.projectile_damage, defaults.projectile_lifetime);
    world.set_flags(id, EntityFlags::ACTIVE | EntityFlags::PROJECTILE);
    Some(id)
}

impl Default for SkillSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for SkillSystem {
    fn name(&self) -> &str {
        "skill"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        Self::update_cooldowns(world, ctx.dt);
        for id in 0..world.capacity() {
            let flags = world.flags(id);
            if flags.is_alive() && flags.is_steerable() {
                self.handle_input(world, ctx.grid, id, ctx.defaults);
            }
        }
        Ok(())
    }
}
