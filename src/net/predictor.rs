//! Client-side prediction and server reconciliation for the local entity.
//!
//! The local step runs the same movement and physics code the server runs,
//! so replaying the unacknowledged inputs from the server's state lands on
//! the live prediction exactly when nothing diverged.
//!
//! The history is never truncated: once it holds `capacity` unacknowledged
//! steps, prediction stalls until the server catches up.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::{
    config::EngineDefaults,
    ecs::{EntityIndex, World},
    protocol::InputMessage,
    systems::{integrate, Body, MovementConfig, MovementSystem, SteeringTarget},
};

/// Drift beyond which the local entity is hard-snapped to the replayed state.
pub const SNAP_THRESHOLD: f32 = 20.0;

pub const DEFAULT_HISTORY_CAPACITY: usize = 128;

/// One predicted step awaiting acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputHistory {
    pub seq: u32,
    pub flags: u8,
    pub target_x: f32,
    pub target_y: f32,
    pub dt: f32,
    pub state_before: Body,
}

pub struct Predictor {
    pending: VecDeque<InputHistory>,
    capacity: usize,
    next_seq: u32,
    map_radius: f32,
    defaults: EngineDefaults,
    snaps: u64,
    stalls: u64,
    stalled: bool,
}

impl Predictor {
    pub fn new(map_radius: f32, defaults: EngineDefaults) -> Self {
        Self::with_capacity(map_radius, defaults, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(map_radius: f32, defaults: EngineDefaults, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            // seq 0 is "nothing processed yet" on the server side
            next_seq: 1,
            map_radius,
            defaults,
            snaps: 0,
            stalls: 0,
            stalled: false,
        }
    }

    /// Apply one local step to `id` immediately and record it.
    ///
    /// Returns `None` without touching the world while the history is full.
    pub fn predict(
        &mut self,
        world: &mut World,
        id: EntityIndex,
        target_x: f32,
        target_y: f32,
        flags: u8,
        dt: f32,
    ) -> Option<InputMessage> {
        if self.is_full() {
            if !self.stalled {
                self.stalled = true;
                warn!(
                    pending = self.pending.len(),
                    "input history full, holding prediction until acknowledged"
                );
            }
            self.stalls += 1;
            return None;
        }
        self.stalled = false;

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        let state_before = Body::read(world, id);
        let target = SteeringTarget {
            x: target_x,
            y: target_y,
        };
        MovementSystem::step_input(world, id, target, self.map_radius, &self.defaults, dt);

        self.pending.push_back(InputHistory {
            seq,
            flags,
            target_x,
            target_y,
            dt,
            state_before,
        });

        Some(InputMessage {
            seq,
            target_x,
            target_y,
            flags,
        })
    }

    /// Correct `id` against the server's `baseline` after it processed
    /// `last_processed`. Returns whether the entity was snapped.
    pub fn reconcile(
        &mut self,
        world: &mut World,
        id: EntityIndex,
        baseline: Body,
        last_processed: u32,
    ) -> bool {
        while self
            .pending
            .front()
            .is_some_and(|entry| entry.seq <= last_processed)
        {
            self.pending.pop_front();
        }

        let replayed = self.replay(world, id, baseline);
        let live = Body::read(world, id);
        let drift = live.distance_to(&replayed);
        if drift <= SNAP_THRESHOLD {
            return false;
        }

        debug!(
            entity = id,
            drift,
            pending = self.pending.len(),
            "prediction diverged, snapping"
        );
        replayed.write(world, id);
        world.transform.set_prev_x(id, replayed.x);
        world.transform.set_prev_y(id, replayed.y);
        self.snaps += 1;
        true
    }

    /// Run every pending input from `baseline` through the shared integrator.
    pub fn replay(&self, world: &World, id: EntityIndex, baseline: Body) -> Body {
        let config = MovementConfig::read(world, id);
        let friction = EngineDefaults::resolve(world.physics.friction(id), self.defaults.friction);
        let radius = world.physics.radius(id);

        let mut body = baseline;
        for entry in &self.pending {
            let target = SteeringTarget {
                x: entry.target_x,
                y: entry.target_y,
            };
            MovementSystem::apply(&mut body, &target, &config, &self.defaults, entry.dt);
            integrate(&mut body, friction, radius, self.map_radius, entry.dt);
        }
        body
    }

    pub fn pending(&self) -> impl Iterator<Item = &InputHistory> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.capacity
    }

    /// Local steps skipped because the history was full.
    pub fn stall_count(&self) -> u64 {
        self.stalls
    }

    /// Seq the next predicted step will carry.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn snap_count(&self) -> u64 {
        self.snaps
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;
    use crate::systems::FIXED_DT;

    fn local_world() -> (World, EntityIndex) {
        let mut world = World::new(4);
        let id = world.spawn(EntityFlags::PLAYER | EntityFlags::LOCAL).unwrap();
        world.transform.set(id, 0.0, 0.0, 0.0, 1.0);
        world.physics.set(id, 0.0, 0.0, 1.0, 10.0, 0.95);
        world.config.clear_entity(id);
        (world, id)
    }

    #[test]
    fn full_history_stalls_instead_of_dropping() {
        let (mut world, id) = local_world();
        let mut predictor = Predictor::with_capacity(1000.0, EngineDefaults::default(), 3);
        for _ in 0..3 {
            assert!(predictor.predict(&mut world, id, 100.0, 0.0, 0, FIXED_DT).is_some());
        }
        let held = Body::read(&world, id);
        assert!(predictor.predict(&mut world, id, 100.0, 0.0, 0, FIXED_DT).is_none());
        assert!(predictor.predict(&mut world, id, 100.0, 0.0, 0, FIXED_DT).is_none());

        assert_eq!(Body::read(&world, id), held);
        assert_eq!(predictor.pending_len(), 3);
        assert_eq!(predictor.pending().next().map(|e| e.seq), Some(1));
        assert_eq!(predictor.next_seq(), 4);
        assert_eq!(predictor.stall_count(), 2);
    }

    #[test]
    fn overflowing_history_still_reconciles_cleanly() {
        let (mut world, id) = local_world();
        let mut predictor = Predictor::with_capacity(1000.0, EngineDefaults::default(), 8);
        let mut states = Vec::new();
        for _ in 0..40 {
            if predictor.predict(&mut world, id, 250.0, -60.0, 0, FIXED_DT).is_some() {
                states.push(Body::read(&world, id));
            }
        }
        assert_eq!(states.len(), 8);

        // the server agrees with our state after seq 2
        assert!(!predictor.reconcile(&mut world, id, states[1], 2));
        assert_eq!(predictor.pending_len(), 6);
        assert_eq!(predictor.snap_count(), 0);
        assert!(predictor.predict(&mut world, id, 250.0, -60.0, 0, FIXED_DT).is_some());
    }

    #[test]
    fn acknowledged_inputs_are_pruned() {
        let (mut world, id) = local_world();
        let mut predictor = Predictor::new(1000.0, EngineDefaults::default());
        let mut states = Vec::new();
        for _ in 0..4 {
            predictor.predict(&mut world, id, 200.0, 50.0, 0, FIXED_DT);
            states.push(Body::read(&world, id));
        }

        // server agrees with our state after seq 2
        assert!(!predictor.reconcile(&mut world, id, states[1], 2));
        let seqs: Vec<_> = predictor.pending().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[test]
    fn replay_from_first_state_reproduces_live_prediction() {
        let (mut world, id) = local_world();
        let mut predictor = Predictor::new(1000.0, EngineDefaults::default());
        for step in 0..20 {
            let tx = if step < 10 { 300.0 } else { -300.0 };
            predictor.predict(&mut world, id, tx, 80.0, 0, FIXED_DT);
        }
        let first = predictor.pending().next().unwrap().state_before;
        assert_eq!(predictor.replay(&world, id, first), Body::read(&world, id));
    }
}
