//! Wandering bots: write a target and the occasional skill press into the
//! input store, exactly as a connected player would.

use anyhow::Result;
use rand::Rng;

use crate::{
    ecs::{EntityIndex, World},
    engine::{System, SystemContext},
    rng::SystemRng,
};

/// Wander targets stay inside this share of the arena radius.
const WANDER_FRACTION: f32 = 0.9;

/// Distance at which a bot counts as having reached its target.
const ARRIVAL_DISTANCE: f32 = 30.0;

pub struct BotSystem {
    retarget_chance: f64,
    skill_chance: f64,
}

impl BotSystem {
    pub fn new() -> Self {
        Self {
            retarget_chance: 1.0 / 240.0,
            skill_chance: 1.0 / 600.0,
        }
    }

    pub fn with_chances(retarget_chance: f64, skill_chance: f64) -> Self {
        Self {
            retarget_chance: retarget_chance.clamp(0.0, 1.0),
            skill_chance: skill_chance.clamp(0.0, 1.0),
        }
    }

    pub fn update(&self, world: &mut World, map_radius: f32, rng: &mut impl Rng) {
        for id in 0..world.capacity() {
            let flags = world.flags(id);
            if !(flags.is_alive() && flags.is_bot()) {
                continue;
            }
            if self.needs_target(world, id) || rng.gen_bool(self.retarget_chance) {
                let (x, y) = wander_target(rng, map_radius * WANDER_FRACTION);
                world.input.set_target(id, x, y);
            }
            if rng.gen_bool(self.skill_chance) {
                world.input.set_skill_active(id, true);
            }
        }
    }

    fn needs_target(&self, world: &World, id: EntityIndex) -> bool {
        let (x, y) = world.transform.position(id);
        let (tx, ty) = world.input.target(id);
        let (dx, dy) = (tx - x, ty - y);
        dx * dx + dy * dy < ARRIVAL_DISTANCE * ARRIVAL_DISTANCE
    }
}

/// Uniform point in the disc of `radius` around the origin.
pub fn wander_target(rng: &mut impl Rng, radius: f32) -> (f32, f32) {
    let r = radius * rng.gen::<f32>().sqrt();
    let theta = rng.gen_range(0.0..std::f32::consts::TAU);
    (r * theta.cos(), r * theta.sin())
}

impl Default for BotSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for BotSystem {
    fn name(&self) -> &str {
        "bot"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        self.update(world, ctx.map_radius, rng);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn bot_at_its_target_picks_a_new_one_inside_the_arena() {
        let mut world = World::new(4);
        let bot = world.spawn(EntityFlags::BOT).unwrap();
        world.transform.set(bot, 0.0, 0.0, 0.0, 1.0);
        world.input.set(bot, 0.0, 0.0, 0);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        BotSystem::with_chances(0.0, 0.0).update(&mut world, 500.0, &mut rng);

        let (tx, ty) = world.input.target(bot);
        assert!((tx, ty) != (0.0, 0.0));
        assert!((tx * tx + ty * ty).sqrt() <= 500.0 * WANDER_FRACTION);
    }

    #[test]
    fn players_are_left_alone() {
        let mut world = World::new(4);
        let player = world.spawn(EntityFlags::PLAYER).unwrap();
        world.transform.set(player, 0.0, 0.0, 0.0, 1.0);
        world.input.set(player, 0.0, 0.0, 0);

        let mut rng = ChaCha8Rng::seed_from_u64(3);
        BotSystem::with_chances(1.0, 1.0).update(&mut world, 500.0, &mut rng);
        assert_eq!(world.input.target(player), (0.0, 0.0));
        assert!(!world.input.consume_skill_input(player));
    }

    #[test]
    fn same_seed_same_targets() {
        let run = || {
            let mut world = World::new(8);
            for _ in 0..4 {
                let bot = world.spawn(EntityFlags::BOT).unwrap();
                world.transform.set(bot, 0.0, 0.0, 0.0, 1.0);
                world.input.set(bot, 0.0, 0.0, 0);
            }
            let mut rng = ChaCha8Rng::seed_from_u64(11);
            BotSystem::new().update(&mut world, 800.0, &mut rng);
            (0..4).map(|id| world.input.target(id)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
