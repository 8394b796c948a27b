//! Projectile lifetimes.
//!
//! Hits are resolved by the collision pass; this system only retires
//! projectiles whose time ran out.

use anyhow::Result;

use crate::{
    ecs::World,
    engine::{System, SystemContext},
    rng::SystemRng,
};

/// Counts projectile lifetimes down and kills the expired ones.
pub struct ProjectileSystem;

impl ProjectileSystem {
    pub fn new() -> Self {
        Self
    }

    pub fn update(world: &mut World, dt: f32) -> usize {
        let mut expired = 0;
        for id in 0..world.capacity() {
            let flags = world.flags(id);
            if !(flags.is_alive() && flags.is_projectile()) {
                continue;
            }
            let remaining = world.projectile.lifetime(id) - dt;
            world.projectile.set_lifetime(id, remaining);
            if remaining <= 0.0 {
                world.mark_dead(id);
                expired += 1;
            }
        }
        expired
    }
}

impl Default for ProjectileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ProjectileSystem {
    fn name(&self) -> &str {
        "projectile"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        Self::update(world, ctx.dt);
        Ok(())
    }
}
