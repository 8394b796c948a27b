//! Periodic JSON dumps of world state for debugging and replay comparison.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ecs::World;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDump {
    pub id: usize,
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub health: f32,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldDump {
    pub arena: String,
    pub tick: u64,
    pub written_at: DateTime<Utc>,
    pub entities: Vec<EntityDump>,
}

impl WorldDump {
    /// Live entities in index order.
    pub fn capture(arena: &str, world: &World) -> Self {
        let entities = world
            .active_indices()
            .filter(|&id| world.is_alive(id))
            .map(|id| {
                let (x, y) = world.transform.position(id);
                let (vx, vy) = world.physics.velocity(id);
                EntityDump {
                    id,
                    kind: world.flags(id).kind_name().to_string(),
                    x,
                    y,
                    vx,
                    vy,
                    radius: world.physics.radius(id),
                    health: world.stats.health(id),
                    score: world.stats.score(id),
                }
            })
            .collect();
        Self {
            arena: arena.to_string(),
            tick: world.tick(),
            written_at: Utc::now(),
            entities,
        }
    }
}

pub struct SnapshotWriter {
    arena: String,
    dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    /// Dumps go to `output_dir/arena`. An interval of 0 disables them.
    pub fn new(output_dir: impl AsRef<Path>, arena: &str, interval: u64) -> Result<Self> {
        let dir = output_dir.as_ref().join(arena);
        if interval > 0 {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        }
        Ok(Self {
            arena: arena.to_string(),
            dir,
            interval,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Write a dump when the world's tick lands on the interval.
    pub fn maybe_write(&self, world: &World) -> Result<Option<PathBuf>> {
        if self.interval == 0 || world.tick() % self.interval != 0 {
            return Ok(None);
        }
        self.write(world).map(Some)
    }

    pub fn write(&self, world: &World) -> Result<PathBuf> {
        let dump = WorldDump::capture(&self.arena, world);
        let path = self.dir.join(format!("tick_{:06}.json", dump.tick));
        let json = serde_json::to_string_pretty(&dump).context("Failed to serialize world dump")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<WorldDump> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;

    #[test]
    fn writes_on_interval_and_reads_back() {
        let temp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp.path(), "duel", 5).unwrap();

        let mut world = World::new(4);
        let id = world.spawn(EntityFlags::BOT).unwrap();
        world.transform.set(id, 1.5, -2.0, 0.0, 1.0);
        world.physics.set(id, 0.0, 0.0, 1.0, 18.0, 0.9);
        let dead = world.spawn(EntityFlags::FOOD).unwrap();
        world.mark_dead(dead);

        for _ in 0..4 {
            world.advance_tick();
            assert!(writer.maybe_write(&world).unwrap().is_none());
        }
        world.advance_tick();
        let path = writer.maybe_write(&world).unwrap().unwrap();
        assert!(path.ends_with("duel/tick_000005.json"));

        let dump = SnapshotWriter::load(&path).unwrap();
        assert_eq!(dump.tick, 5);
        assert_eq!(dump.entities.len(), 1);
        assert_eq!(dump.entities[0].kind, "bot");
        assert_eq!((dump.entities[0].x, dump.entities[0].y), (1.5, -2.0));
    }

    #[test]
    fn zero_interval_never_writes() {
        let temp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(temp.path(), "off", 0).unwrap();
        let world = World::new(1);
        assert!(writer.maybe_write(&world).unwrap().is_none());
        assert!(!temp.path().join("off").exists());
    }
}
