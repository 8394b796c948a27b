use arena_core::{
    config::EngineDefaults,
    ecs::{EntityFlags, World},
    net::{Predictor, SNAP_THRESHOLD},
    systems::{Body, FIXED_DT},
};

const MAP_RADIUS: f32 = 1600.0;

fn local_world() -> (World, usize) {
    let mut world = World::new(2);
    let id = world.spawn(EntityFlags::PLAYER | EntityFlags::LOCAL).unwrap();
    world.transform.set(id, 10.0, -20.0, 0.0, 1.0);
    world.physics.set(id, 0.0, 0.0, 1.0, 20.0, 0.0);
    world.config.clear_entity(id);
    (world, id)
}

/// Predict `steps` inputs, returning the state after each one.
fn predict_path(predictor: &mut Predictor, world: &mut World, id: usize, steps: u32) -> Vec<Body> {
    (0..steps)
        .map(|n| {
            let tx = 400.0 * (n as f32 * 0.1).cos();
            let ty = 400.0 * (n as f32 * 0.1).sin();
            predictor.predict(world, id, tx, ty, 0, FIXED_DT);
            Body::read(world, id)
        })
        .collect()
}

#[test]
fn agreeing_server_state_never_snaps() {
    let (mut world, id) = local_world();
    let mut predictor = Predictor::new(MAP_RADIUS, EngineDefaults::default());
    let path = predict_path(&mut predictor, &mut world, id, 30);
    let live = Body::read(&world, id);

    // server has processed seq 10 and agrees exactly
    assert!(!predictor.reconcile(&mut world, id, path[9], 10));
    assert_eq!(predictor.pending_len(), 20);
    assert_eq!(Body::read(&world, id), live);

    // replaying the remaining inputs from the acked state lands on the live one
    assert_eq!(predictor.replay(&world, id, path[9]), live);
}

#[test]
fn small_drift_keeps_the_live_prediction() {
    let (mut world, id) = local_world();
    let mut predictor = Predictor::new(MAP_RADIUS, EngineDefaults::default());
    let path = predict_path(&mut predictor, &mut world, id, 12);
    let live = Body::read(&world, id);

    let mut nudged = path[5];
    nudged.x += 2.0;
    assert!(!predictor.reconcile(&mut world, id, nudged, 6));
    assert_eq!(Body::read(&world, id), live);
}

#[test]
fn large_drift_snaps_to_replayed_state() {
    let (mut world, id) = local_world();
    let mut predictor = Predictor::new(MAP_RADIUS, EngineDefaults::default());
    let path = predict_path(&mut predictor, &mut world, id, 12);

    let mut moved = path[5];
    moved.x += SNAP_THRESHOLD * 5.0;

    assert!(predictor.reconcile(&mut world, id, moved, 6));
    assert_eq!(predictor.pending_len(), 6);
    assert_eq!(Body::read(&world, id), predictor.replay(&world, id, moved));
    assert_eq!(predictor.snap_count(), 1);
}

#[test]
fn fully_acknowledged_history_empties_the_queue() {
    let (mut world, id) = local_world();
    let mut predictor = Predictor::new(MAP_RADIUS, EngineDefaults::default());
    let path = predict_path(&mut predictor, &mut world, id, 8);
    predictor.reconcile(&mut world, id, path[7], 8);
    assert_eq!(predictor.pending_len(), 0);
}
