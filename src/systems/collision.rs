//! Food pickup and projectile hits, resolved against the freshly rebuilt grid.

use anyhow::Result;
use tracing::{debug, trace};

use crate::{
    config::EngineDefaults,
    ecs::{EntityIndex, World},
    engine::{Stage, System, SystemContext},
    rng::SystemRng,
    spatial::SpatialGrid,
};

/// Score granted by food whose own score field is unset.
const DEFAULT_FOOD_VALUE: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    pub pickups: usize,
    pub hits: usize,
    pub kills: usize,
}

pub struct CollisionSystem {
    scratch: Vec<EntityIndex>,
}

impl CollisionSystem {
    pub fn new() -> Self {
        Self {
            scratch: Vec::with_capacity(64),
        }
    }

    pub fn update(
        &mut self,
        world: &mut World,
        grid: &SpatialGrid,
        defaults: &EngineDefaults,
    ) -> CollisionStats {
        let mut stats = CollisionStats::default();
        for id in 0..world.capacity() {
            let flags = world.flags(id);
            if !flags.is_alive() {
                continue;
            }
            if flags.is_steerable() {
                stats.pickups += self.eat(world, grid, id, defaults);
            } else if flags.is_projectile() {
                self.strike(world, grid, id, &mut stats);
            }
        }
        stats
    }

    fn eat(
        &mut self,
        world: &mut World,
        grid: &SpatialGrid,
        id: EntityIndex,
        defaults: &EngineDefaults,
    ) -> usize {
        let (x, y) = world.transform.position(id);
        let reach = world.physics.radius(id)
            + EngineDefaults::resolve(world.config.pickup_range(id), defaults.pickup_range);
        self.query(grid, x, y, reach);

        let mut eaten = 0;
        for &other in &self.scratch {
            let flags = world.flags(other);
            if other == id || !(flags.is_alive() && flags.is_food()) {
                continue;
            }
            let value = EngineDefaults::resolve(world.stats.score(other), DEFAULT_FOOD_VALUE);
            world.stats.set_score(id, world.stats.score(id) + value);
            world.mark_dead(other);
            eaten += 1;
        }
        eaten
    }

    fn strike(
        &mut self,
        world: &mut World,
        grid: &SpatialGrid,
        id: EntityIndex,
        stats: &mut CollisionStats,
    ) {
        let (x, y) = world.transform.position(id);
        let owner = world.projectile.owner(id);
        self.query(grid, x, y, world.physics.radius(id));

        for &target in &self.scratch {
            let flags = world.flags(target);
            if target == owner || !(flags.is_alive() && flags.is_steerable()) {
                continue;
            }
            let health = world.stats.health(target) - world.projectile.damage(id);
            world.stats.set_health(target, health);
            world.mark_dead(id);
            stats.hits += 1;
            trace!(projectile = id, target, health, "projectile hit");
            if health <= 0.0 {
                world.mark_dead(target);
                stats.kills += 1;
                debug!(target, killer = owner, "entity killed");
            }
            break;
        }
    }

    /// Candidates in ascending index order, each once.
    fn query(&mut self, grid: &SpatialGrid, x: f32, y: f32, r: f32) {
        grid.query_radius_into(x, y, r, &mut self.scratch);
        self.scratch.sort_unstable();
        self.scratch.dedup();
    }
}

impl Default for CollisionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for CollisionSystem {
    fn name(&self) -> &str {
        "collision"
    }

    fn stage(&self) -> Stage {
        Stage::Resolve
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let stats = self.update(world, ctx.grid, ctx.defaults);
        if stats != CollisionStats::default() {
            trace!(tick = ctx.tick, ?stats, "collisions resolved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;

    fn body(world: &mut World, kind: EntityFlags, x: f32, y: f32, radius: f32) -> EntityIndex {
        let id = world.spawn(kind).unwrap();
        world.transform.set(id, x, y, 0.0, 1.0);
        world.physics.set(id, 0.0, 0.0, 1.0, radius, 0.9);
        world.stats.set(id, 100.0, 100.0, 0.0, 0.0);
        world.config.clear_entity(id);
        id
    }

    fn grid_for(world: &World) -> SpatialGrid {
        let mut grid = SpatialGrid::new(world.capacity(), 500.0, 50.0);
        grid.rebuild(world);
        grid
    }

    #[test]
    fn players_eat_food_in_reach() {
        let defaults = EngineDefaults::default();
        let mut world = World::new(8);
        let player = body(&mut world, EntityFlags::PLAYER, 0.0, 0.0, 10.0);
        let near = body(&mut world, EntityFlags::FOOD, 12.0, 0.0, 2.0);
        world.stats.set_score(near, 3.0);
        let far = body(&mut world, EntityFlags::FOOD, 200.0, 0.0, 2.0);

        let grid = grid_for(&world);
        let stats = CollisionSystem::new().update(&mut world, &grid, &defaults);

        assert_eq!(stats.pickups, 1);
        assert!(world.is_dead(near));
        assert!(world.is_alive(far));
        assert_eq!(world.stats.score(player), 3.0);
    }

    #[test]
    fn food_is_eaten_once() {
        let defaults = EngineDefaults::default();
        let mut world = World::new(8);
        let a = body(&mut world, EntityFlags::PLAYER, -5.0, 0.0, 10.0);
        let b = body(&mut world, EntityFlags::BOT, 5.0, 0.0, 10.0);
        body(&mut world, EntityFlags::FOOD, 0.0, 0.0, 2.0);

        let grid = grid_for(&world);
        CollisionSystem::new().update(&mut world, &grid, &defaults);
        assert_eq!(world.stats.score(a) + world.stats.score(b), DEFAULT_FOOD_VALUE);
    }

    #[test]
    fn projectiles_skip_their_owner_and_kill() {
        let defaults = EngineDefaults::default();
        let mut world = World::new(8);
        let owner = body(&mut world, EntityFlags::PLAYER, 0.0, 0.0, 10.0);
        let victim = body(&mut world, EntityFlags::BOT, 14.0, 0.0, 10.0);
        world.stats.set_health(victim, 20.0);
        let shot = body(&mut world, EntityFlags::PROJECTILE, 8.0, 0.0, 6.0);
        world.projectile.set(shot, owner, 25.0, 1.0);

        let grid = grid_for(&world);
        let stats = CollisionSystem::new().update(&mut world, &grid, &defaults);

        assert_eq!(stats.hits, 1);
        assert_eq!(stats.kills, 1);
        assert!(world.is_dead(shot));
        assert!(world.is_dead(victim));
        assert!(world.is_alive(owner));
        assert_eq!(world.stats.health(owner), 100.0);
    }
}
