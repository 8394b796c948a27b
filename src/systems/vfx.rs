//! Bounded queue of visual-effect events for the renderer.
//!
//! The simulation pushes, the renderer drains. When nobody drains the queue
//! the oldest events are overwritten; the simulation never waits on it.

use crate::ecs::EntityIndex;

pub const DEFAULT_VFX_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VfxKind {
    Dash = 0,
    Shockwave = 1,
    Pierce = 2,
    LargeShockwave = 3,
}

/// Plain-data event; `value` is kind specific (radius, speed, spawned index).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VfxEvent {
    pub kind: VfxKind,
    pub entity: EntityIndex,
    pub x: f32,
    pub y: f32,
    pub value: f32,
}

impl VfxEvent {
    const EMPTY: Self = Self {
        kind: VfxKind::Dash,
        entity: 0,
        x: 0.0,
        y: 0.0,
        value: 0.0,
    };
}

pub struct VfxQueue {
    events: Vec<VfxEvent>,
    head: usize,
    len: usize,
    overwritten: u64,
}

impl VfxQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: vec![VfxEvent::EMPTY; capacity.max(1)],
            head: 0,
            len: 0,
            overwritten: 0,
        }
    }

    pub fn push(&mut self, event: VfxEvent) {
        let capacity = self.events.len();
        if self.len == capacity {
            self.head = (self.head + 1) % capacity;
            self.len -= 1;
            self.overwritten += 1;
        }
        let slot = (self.head + self.len) % capacity;
        self.events[slot] = event;
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<VfxEvent> {
        if self.len == 0 {
            return None;
        }
        let event = self.events[self.head];
        self.head = (self.head + 1) % self.events.len();
        self.len -= 1;
        Some(event)
    }

    /// Hand every queued event to `consume`, oldest first, leaving the queue empty.
    pub fn drain(&mut self, mut consume: impl FnMut(VfxEvent)) {
        while let Some(event) = self.pop() {
            consume(event);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// Events lost because the queue was full.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl Default for VfxQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VFX_CAPACITY)
    }
}
