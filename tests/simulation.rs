use arena_core::{
    config::EngineDefaults,
    ecs::{EntityFlags, World},
    engine::{EngineBuilder, EngineSettings},
    spatial::SpatialGrid,
    systems::{Body, MovementSystem, PhysicsSystem, FIXED_DT},
};

const MAP_RADIUS: f32 = 1600.0;

fn coasting_world() -> (World, usize) {
    let mut world = World::new(8);
    let id = world.spawn(EntityFlags::PLAYER).unwrap();
    world.transform.set(id, 0.0, 0.0, 0.0, 1.0);
    world.physics.set(id, 100.0, 100.0, 1.0, 20.0, 0.0);
    world.config.clear_entity(id);
    world.input.set(id, 0.0, 0.0, 0);
    (world, id)
}

fn coast(steps: usize) -> Body {
    let (mut world, id) = coasting_world();
    let defaults = EngineDefaults::default();
    for _ in 0..steps {
        PhysicsSystem::update(&mut world, MAP_RADIUS, &defaults, FIXED_DT);
    }
    Body::read(&world, id)
}

#[test]
fn identical_runs_are_bit_identical() {
    let first = coast(600);
    let second = coast(600);
    assert_eq!(first.x.to_bits(), second.x.to_bits());
    assert_eq!(first.y.to_bits(), second.y.to_bits());
    assert_eq!(first.vx.to_bits(), second.vx.to_bits());
    assert_eq!(first.vy.to_bits(), second.vy.to_bits());

    let initial = Body::new(0.0, 0.0, 100.0, 100.0);
    assert!(first.speed() < initial.speed());
}

#[test]
fn systems_never_touch_inactive_slots() {
    let (mut world, _) = coasting_world();
    let ghost = 5;
    world.transform.set(ghost, 12.0, 34.0, 0.0, 1.0);
    world.physics.set(ghost, 7.0, -7.0, 1.0, 20.0, 0.5);
    world.input.set(ghost, 900.0, 900.0, 0);

    let defaults = EngineDefaults::default();
    for _ in 0..120 {
        MovementSystem::update(&mut world, &defaults, FIXED_DT);
        PhysicsSystem::update(&mut world, MAP_RADIUS, &defaults, FIXED_DT);
    }
    assert_eq!(world.transform.position(ghost), (12.0, 34.0));
    assert_eq!(world.physics.velocity(ghost), (7.0, -7.0));
}

#[test]
fn entities_stay_inside_the_arena() {
    let mut world = World::new(4);
    let id = world.spawn(EntityFlags::BOT).unwrap();
    world.transform.set(id, 0.0, 0.0, 0.0, 1.0);
    world.physics.set(id, 0.0, 0.0, 1.0, 30.0, 0.0);
    world.config.clear_entity(id);
    world.input.set(id, 10_000.0, 0.0, 0);

    let defaults = EngineDefaults::default();
    let map_radius = 300.0;
    for _ in 0..600 {
        MovementSystem::update(&mut world, &defaults, FIXED_DT);
        PhysicsSystem::update(&mut world, map_radius, &defaults, FIXED_DT);
        let body = Body::read(&world, id);
        let dist = (body.x * body.x + body.y * body.y).sqrt();
        assert!(dist <= map_radius - 30.0 + 1e-3, "escaped to {dist}");
    }
}

#[test]
fn full_pipeline_is_deterministic_for_a_seed() {
    let run = || {
        let settings = EngineSettings {
            capacity: 64,
            map_radius: 600.0,
            ..EngineSettings::default()
        };
        let mut engine = EngineBuilder::new(settings).with_default_systems().build();
        let mut world = World::new(64);
        for n in 0..6 {
            let id = world.spawn(EntityFlags::BOT).unwrap();
            world.transform.set(id, n as f32 * 40.0 - 100.0, 0.0, 0.0, 1.0);
            world.physics.set(id, 0.0, 0.0, 1.0, 18.0, 0.0);
            world.stats.set(id, 60.0, 60.0, 0.0, 0.0);
            world.config.clear_entity(id);
            world.skill.set(id, 0.0, 0.0, (n % 4) as u8);
            world.input.set(id, 0.0, 0.0, 0);
        }
        engine.run(&mut world, 300).unwrap();
        world
            .active_indices()
            .map(|id| Body::read(&world, id))
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn grid_finds_multi_cell_entities_from_every_cell() {
    let mut world = World::new(4);
    let big = world.spawn(EntityFlags::BOT).unwrap();
    world.transform.set(big, 0.0, 0.0, 0.0, 1.0);
    world.physics.set(big, 0.0, 0.0, 1.0, 40.0, 0.0);

    let mut grid = SpatialGrid::new(4, 500.0, 50.0);
    grid.rebuild(&world);

    let mut out = Vec::new();
    for (x, y) in [(-20.0, -20.0), (20.0, -20.0), (-20.0, 20.0), (20.0, 20.0)] {
        grid.query_radius_into(x, y, 1.0, &mut out);
        assert!(out.contains(&big), "missed from ({x}, {y})");
    }

    assert!(grid.remove(big));
    grid.query_radius_into(0.0, 0.0, 100.0, &mut out);
    assert!(out.is_empty());
}
