//! Arena configuration: construction-time settings for one world.
//!
//! Loaded from YAML; every field has a default so a config file only names
//! what it changes. Values are fixed for the lifetime of a world.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ecs::DEFAULT_CAPACITY;

/// Wire snapshots address entities with a `u16`.
pub const MAX_CAPACITY: usize = u16::MAX as usize + 1;

fn default_name() -> String {
    "arena".to_string()
}

fn default_seed() -> u64 {
    7
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_tick_rate() -> u32 {
    60
}

fn default_map_radius() -> f32 {
    1600.0
}

fn default_cell_size() -> f32 {
    100.0
}

fn default_max_catch_up_steps() -> u32 {
    5
}

fn default_bots() -> usize {
    8
}

fn default_food_target() -> usize {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Fallbacks used whenever a per-entity config value is zero. Systems read
/// these instead of embedding balance constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDefaults {
    pub max_speed: f32,
    pub speed_multiplier: f32,
    pub acceleration: f32,
    pub friction: f32,
    pub magnet_radius: f32,
    pub pickup_range: f32,
    pub vision_range: f32,
    pub skill_cooldown: f32,
    /// Dash speed as a multiple of the effective max speed.
    pub dash_factor: f32,
    pub shockwave_radius: f32,
    pub large_shockwave_radius: f32,
    /// Speed added to a neighbor at the shockwave center, fading to zero at
    /// the edge.
    pub shockwave_force: f32,
    pub projectile_speed: f32,
    pub projectile_radius: f32,
    pub projectile_damage: f32,
    pub projectile_lifetime: f32,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            max_speed: 20.0,
            speed_multiplier: 1.0,
            acceleration: 120.0,
            friction: 0.95,
            magnet_radius: 0.0,
            pickup_range: 4.0,
            vision_range: 900.0,
            skill_cooldown: 2.0,
            dash_factor: 3.0,
            shockwave_radius: 120.0,
            large_shockwave_radius: 300.0,
            shockwave_force: 40.0,
            projectile_speed: 60.0,
            projectile_radius: 6.0,
            projectile_damage: 25.0,
            projectile_lifetime: 1.2,
        }
    }
}

impl EngineDefaults {
    /// `value` when it is set (> 0), the engine default otherwise.
    pub fn resolve(value: f32, default: f32) -> f32 {
        if value > 0.0 {
            value
        } else {
            default
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    #[serde(default = "default_map_radius")]
    pub map_radius: f32,
    #[serde(default = "default_cell_size")]
    pub cell_size: f32,
    #[serde(default = "default_max_catch_up_steps")]
    pub max_catch_up_steps: u32,
    #[serde(default = "default_bots")]
    pub bots: usize,
    #[serde(default = "default_food_target")]
    pub food_target: usize,
    #[serde(default)]
    pub ticks: Option<u64>,
    /// State dump interval; 0 disables dumps.
    #[serde(default)]
    pub snapshot_interval_ticks: u64,
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub defaults: EngineDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            seed: default_seed(),
            capacity: default_capacity(),
            tick_rate: default_tick_rate(),
            map_radius: default_map_radius(),
            cell_size: default_cell_size(),
            max_catch_up_steps: default_max_catch_up_steps(),
            bots: default_bots(),
            food_target: default_food_target(),
            ticks: None,
            snapshot_interval_ticks: 0,
            snapshot_dir: None,
            defaults: EngineDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("capacity must be greater than zero")]
    ZeroCapacity,
    #[error("capacity {0} exceeds the wire limit of {MAX_CAPACITY}")]
    CapacityTooLarge(usize),
    #[error("tick rate must be greater than zero")]
    ZeroTickRate,
    #[error("map radius must be positive, got {0}")]
    InvalidMapRadius(f32),
    #[error("cell size must be positive, got {0}")]
    InvalidCellSize(f32),
    #[error("{requested} initial entities do not fit in capacity {capacity}")]
    TooManySpawns { requested: usize, capacity: usize },
}

impl ArenaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.capacity > MAX_CAPACITY {
            return Err(ConfigError::CapacityTooLarge(self.capacity));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if !(self.map_radius > 0.0) {
            return Err(ConfigError::InvalidMapRadius(self.map_radius));
        }
        if !(self.cell_size > 0.0) {
            return Err(ConfigError::InvalidCellSize(self.cell_size));
        }
        let requested = self.bots + self.food_target;
        if requested > self.capacity {
            return Err(ConfigError::TooManySpawns {
                requested,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Fixed step length in seconds.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    pub fn ticks(&self, override_ticks: Option<u64>) -> u64 {
        override_ticks
            .or(self.ticks)
            .unwrap_or(u64::from(self.tick_rate) * 10)
    }
}

pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<ArenaConfig> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read arena config {}", path.display()))?;
        let config: ArenaConfig = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid arena config {}", path.display()))?;
        Ok(config)
    }
}
