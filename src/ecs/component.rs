//! Component storage with Structure of Arrays (SoA) layout
//!
//! Every store is one flat `Vec<f32>` with a fixed stride; field `f` of
//! entity `i` lives at `i * STRIDE + f`. Stores never check the ACTIVE flag,
//! callers do.

use super::EntityIndex;

/// Type-erased view over a strided store.
pub trait ComponentStore: Send + Sync {
    fn stride(&self) -> usize;
    fn data(&self) -> &[f32];
    fn data_mut(&mut self) -> &mut [f32];

    fn capacity(&self) -> usize {
        self.data().len() / self.stride()
    }

    fn clear(&mut self) {
        self.data_mut().fill(0.0);
    }

    /// Raw record of one entity.
    fn record(&self, id: EntityIndex) -> &[f32] {
        let stride = self.stride();
        &self.data()[id * stride..(id + 1) * stride]
    }
}

macro_rules! component_store {
    (
        $(#[$meta:meta])*
        $name:ident, stride = $stride:expr, {
            $($field:ident / $setter:ident = $offset:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            data: Vec<f32>,
        }

        impl $name {
            pub const STRIDE: usize = $stride;

            pub fn new(capacity: usize) -> Self {
                Self {
                    data: vec![0.0; capacity * $stride],
                }
            }

            $(
                #[inline]
                pub fn $field(&self, id: EntityIndex) -> f32 {
                    self.data[id * $stride + $offset]
                }

                #[inline]
                pub fn $setter(&mut self, id: EntityIndex, value: f32) {
                    self.data[id * $stride + $offset] = value;
                }
            )+
        }

        impl ComponentStore for $name {
            fn stride(&self) -> usize {
                $stride
            }

            fn data(&self) -> &[f32] {
                &self.data
            }

            fn data_mut(&mut self) -> &mut [f32] {
                &mut self.data
            }
        }
    };
}

component_store! {
    /// Position and render state. `prev_x`/`prev_y` hold the position from
    /// before the last integration step, for render interpolation only.
    TransformStore, stride = 6, {
        x / set_x = 0,
        y / set_y = 1,
        rotation / set_rotation = 2,
        scale / set_scale = 3,
        prev_x / set_prev_x = 4,
        prev_y / set_prev_y = 5,
    }
}

impl TransformStore {
    pub fn set(&mut self, id: EntityIndex, x: f32, y: f32, rotation: f32, scale: f32) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE].copy_from_slice(&[x, y, rotation, scale, x, y]);
    }

    pub fn position(&self, id: EntityIndex) -> (f32, f32) {
        let base = id * Self::STRIDE;
        (self.data[base], self.data[base + 1])
    }

    pub fn set_position(&mut self, id: EntityIndex, x: f32, y: f32) {
        let base = id * Self::STRIDE;
        self.data[base] = x;
        self.data[base + 1] = y;
    }

    /// Position blended between the previous and current step.
    pub fn interpolated(&self, id: EntityIndex, alpha: f32) -> (f32, f32) {
        let (x, y) = self.position(id);
        let px = self.prev_x(id);
        let py = self.prev_y(id);
        (px + (x - px) * alpha, py + (y - py) * alpha)
    }
}

component_store! {
    PhysicsStore, stride = 5, {
        vx / set_vx = 0,
        vy / set_vy = 1,
        mass / set_mass = 2,
        radius / set_radius = 3,
        friction / set_friction = 4,
    }
}

impl PhysicsStore {
    pub fn set(
        &mut self,
        id: EntityIndex,
        vx: f32,
        vy: f32,
        mass: f32,
        radius: f32,
        friction: f32,
    ) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE].copy_from_slice(&[vx, vy, mass, radius, friction]);
    }

    pub fn velocity(&self, id: EntityIndex) -> (f32, f32) {
        let base = id * Self::STRIDE;
        (self.data[base], self.data[base + 1])
    }

    pub fn set_velocity(&mut self, id: EntityIndex, vx: f32, vy: f32) {
        let base = id * Self::STRIDE;
        self.data[base] = vx;
        self.data[base + 1] = vy;
    }
}

component_store! {
    StatsStore, stride = 4, {
        health / set_health = 0,
        max_health / set_max_health = 1,
        score / set_score = 2,
        match_percent / set_match_percent = 3,
    }
}

impl StatsStore {
    pub fn set(
        &mut self,
        id: EntityIndex,
        health: f32,
        max_health: f32,
        score: f32,
        match_percent: f32,
    ) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE]
            .copy_from_slice(&[health, max_health, score, match_percent]);
    }
}

component_store! {
    /// Per-entity tuning. Zero means "use the engine default".
    ConfigStore, stride = 5, {
        max_speed / set_max_speed = 0,
        speed_multiplier / set_speed_multiplier = 1,
        magnet_radius / set_magnet_radius = 2,
        pickup_range / set_pickup_range = 3,
        vision_range / set_vision_range = 4,
    }
}

impl ConfigStore {
    pub fn set(
        &mut self,
        id: EntityIndex,
        max_speed: f32,
        speed_multiplier: f32,
        magnet_radius: f32,
        pickup_range: f32,
        vision_range: f32,
    ) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE].copy_from_slice(&[
            max_speed,
            speed_multiplier,
            magnet_radius,
            pickup_range,
            vision_range,
        ]);
    }

    /// Reset every field to "engine default".
    pub fn clear_entity(&mut self, id: EntityIndex) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE].fill(0.0);
    }
}

component_store! {
    /// Cooldown state and the shape id that selects the skill behavior.
    SkillStore, stride = 3, {
        cooldown / set_cooldown = 0,
        max_cooldown / set_max_cooldown = 1,
        shape / set_shape = 2,
    }
}

impl SkillStore {
    pub fn set(&mut self, id: EntityIndex, cooldown: f32, max_cooldown: f32, shape: u8) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE].copy_from_slice(&[
            cooldown,
            max_cooldown,
            f32::from(shape),
        ]);
    }
}

component_store! {
    ProjectileStore, stride = 3, {
        owner_raw / set_owner_raw = 0,
        damage / set_damage = 1,
        lifetime / set_lifetime = 2,
    }
}

impl ProjectileStore {
    pub fn set(&mut self, id: EntityIndex, owner: EntityIndex, damage: f32, lifetime: f32) {
        let base = id * Self::STRIDE;
        self.data[base..base + Self::STRIDE].copy_from_slice(&[owner as f32, damage, lifetime]);
    }

    /// Owner index; exact for any capacity below 2^24.
    pub fn owner(&self, id: EntityIndex) -> EntityIndex {
        self.owner_raw(id) as EntityIndex
    }
}

/// Action bits carried by the input record and the input message.
pub mod actions {
    pub const SKILL: u8 = 1 << 0;
    /// Reserved: decoded from the wire, never applied to a store.
    pub const EJECT: u8 = 1 << 1;
}

/// Steering target, held action bits, and the last input sequence applied.
///
/// The skill bit is edge triggered: [`InputStore::consume_skill_input`]
/// returns `true` once per press so several passes in one tick cannot cast
/// twice.
#[derive(Debug, Clone)]
pub struct InputStore {
    targets: Vec<f32>,
    actions: Vec<u8>,
    last_seq: Vec<u32>,
}

impl InputStore {
    pub const STRIDE: usize = 2;

    pub fn new(capacity: usize) -> Self {
        Self {
            targets: vec![0.0; capacity * Self::STRIDE],
            actions: vec![0; capacity],
            last_seq: vec![0; capacity],
        }
    }

    /// Write a full record.
    pub fn set(&mut self, id: EntityIndex, target_x: f32, target_y: f32, actions: u8) {
        self.set_target(id, target_x, target_y);
        self.actions[id] = actions;
        self.last_seq[id] = 0;
    }

    pub fn target(&self, id: EntityIndex) -> (f32, f32) {
        let base = id * Self::STRIDE;
        (self.targets[base], self.targets[base + 1])
    }

    pub fn set_target(&mut self, id: EntityIndex, x: f32, y: f32) {
        let base = id * Self::STRIDE;
        self.targets[base] = x;
        self.targets[base + 1] = y;
    }

    pub fn actions(&self, id: EntityIndex) -> u8 {
        self.actions[id]
    }

    pub fn set_skill_active(&mut self, id: EntityIndex, active: bool) {
        if active {
            self.actions[id] |= actions::SKILL;
        } else {
            self.actions[id] &= !actions::SKILL;
        }
    }

    /// Read-and-reset of the skill bit.
    pub fn consume_skill_input(&mut self, id: EntityIndex) -> bool {
        let pressed = self.actions[id] & actions::SKILL != 0;
        self.actions[id] &= !actions::SKILL;
        pressed
    }

    pub fn last_seq(&self, id: EntityIndex) -> u32 {
        self.last_seq[id]
    }

    pub fn set_last_seq(&mut self, id: EntityIndex, seq: u32) {
        self.last_seq[id] = seq;
    }

    pub fn clear(&mut self) {
        self.targets.fill(0.0);
        self.actions.fill(0);
        self.last_seq.fill(0);
    }
}
