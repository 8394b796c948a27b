//! Per-entity bitmask flags.
//!
//! Bits 0..=8 are engine concepts shared by every module. Bits 9 and up carry
//! module-specific subtypes (food kind, boss variant, ...), read back through
//! [`EntityFlags::subtype`].

use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntityFlags(pub u32);

impl EntityFlags {
    pub const NONE: Self = Self(0);

    /// Slot holds a live entity; every store read is gated on this bit.
    pub const ACTIVE: Self = Self(1 << 0);

    /// Entity died this tick; kept one frame for death-event consumers.
    pub const DEAD: Self = Self(1 << 1);

    pub const PLAYER: Self = Self(1 << 2);
    pub const BOT: Self = Self(1 << 3);
    pub const FOOD: Self = Self(1 << 4);
    pub const PROJECTILE: Self = Self(1 << 5);
    pub const BOSS: Self = Self(1 << 6);

    /// Entity is driven by the local client (prediction target).
    pub const LOCAL: Self = Self(1 << 7);

    /// Stepped once per client input by the room instead of by the engine's
    /// movement and physics passes.
    pub const INPUT_DRIVEN: Self = Self(1 << 8);

    /// Entities that seek their input target every tick.
    pub const STEERABLE: Self = Self(Self::PLAYER.0 | Self::BOT.0 | Self::BOSS.0);

    pub const ENGINE_MASK: u32 = 0x1FF;
    pub const SUBTYPE_SHIFT: u32 = 9;

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub const fn subtype(self) -> u32 {
        self.0 >> Self::SUBTYPE_SHIFT
    }

    pub const fn with_subtype(self, subtype: u32) -> Self {
        Self((self.0 & Self::ENGINE_MASK) | (subtype << Self::SUBTYPE_SHIFT))
    }

    pub const fn is_active(self) -> bool {
        self.contains(Self::ACTIVE)
    }

    pub const fn is_dead(self) -> bool {
        self.contains(Self::DEAD)
    }

    /// Active and not waiting to be reaped.
    pub const fn is_alive(self) -> bool {
        self.is_active() && !self.is_dead()
    }

    pub const fn is_player(self) -> bool {
        self.contains(Self::PLAYER)
    }

    pub const fn is_bot(self) -> bool {
        self.contains(Self::BOT)
    }

    pub const fn is_food(self) -> bool {
        self.contains(Self::FOOD)
    }

    pub const fn is_projectile(self) -> bool {
        self.contains(Self::PROJECTILE)
    }

    pub const fn is_boss(self) -> bool {
        self.contains(Self::BOSS)
    }

    pub const fn is_local(self) -> bool {
        self.contains(Self::LOCAL)
    }

    pub const fn is_input_driven(self) -> bool {
        self.contains(Self::INPUT_DRIVEN)
    }

    pub const fn is_steerable(self) -> bool {
        self.intersects(Self::STEERABLE)
    }

    /// Short label for logs and state dumps.
    pub fn kind_name(self) -> &'static str {
        if self.is_player() {
            "player"
        } else if self.is_bot() {
            "bot"
        } else if self.is_boss() {
            "boss"
        } else if self.is_food() {
            "food"
        } else if self.is_projectile() {
            "projectile"
        } else {
            "entity"
        }
    }
}

impl BitOr for EntityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EntityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EntityFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}
