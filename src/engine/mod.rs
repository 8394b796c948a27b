//! Fixed-step simulation engine for one world.
//!
//! A tick runs to completion: reap last tick's dead, run the integrate-stage
//! systems, rebuild the spatial grid, run the resolve-stage systems. Nothing
//! inside a tick yields or can be cancelled.

mod clock;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::{
    config::{ArenaConfig, EngineDefaults},
    ecs::{EntityIndex, World},
    rng::{RngManager, SystemRng},
    spatial::{RebuildStats, SpatialGrid},
    systems::{
        BotSystem, CollisionSystem, MovementSystem, PhysicsSystem, ProjectileSystem, SkillSystem,
    },
};

pub use clock::FixedStep;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub capacity: usize,
    pub tick_rate: u32,
    pub map_radius: f32,
    pub cell_size: f32,
    pub seed: u64,
    pub max_catch_up_steps: u32,
    pub defaults: EngineDefaults,
}

impl EngineSettings {
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            capacity: config.capacity,
            tick_rate: config.tick_rate,
            map_radius: config.map_radius,
            cell_size: config.cell_size,
            seed: config.seed,
            max_catch_up_steps: config.max_catch_up_steps,
            defaults: config.defaults,
        }
    }

    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ArenaConfig::default())
    }
}

/// When a system runs relative to the grid rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Before the rebuild: the grid still reflects last tick.
    Integrate,
    /// After the rebuild: grid queries see this tick's positions.
    Resolve,
}

pub struct SystemContext<'a> {
    pub tick: u64,
    pub dt: f32,
    pub map_radius: f32,
    pub defaults: &'a EngineDefaults,
    pub grid: &'a SpatialGrid,
}

pub trait System: Send {
    fn name(&self) -> &str;

    fn stage(&self) -> Stage {
        Stage::Integrate
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()>;
}

pub struct EngineBuilder {
    settings: EngineSettings,
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            systems: Vec::new(),
        }
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn push_system(&mut self, system: impl System + 'static) {
        self.systems.push(Box::new(system));
    }

    /// The authoritative server pipeline, in tick order.
    pub fn with_default_systems(self) -> Self {
        self.with_system(BotSystem::new())
            .with_system(MovementSystem::new())
            .with_system(SkillSystem::new())
            .with_system(PhysicsSystem::new())
            .with_system(ProjectileSystem::new())
            .with_system(CollisionSystem::new())
    }

    pub fn build(self) -> Engine {
        let settings = self.settings;
        Engine {
            rng: RngManager::new(settings.seed),
            grid: SpatialGrid::new(settings.capacity, settings.map_radius, settings.cell_size),
            clock: FixedStep::new(settings.tick_rate, settings.max_catch_up_steps),
            systems: self.systems,
            reaped: Vec::with_capacity(settings.capacity),
            settings,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SystemRunReport {
    pub name: String,
    pub duration_ms: f64,
}

#[derive(Clone, Debug)]
pub struct TickSummary {
    pub tick: u64,
    pub reaped: usize,
    pub grid: RebuildStats,
    pub system_reports: Vec<SystemRunReport>,
}

#[derive(Clone, Debug, Default)]
pub struct FrameSummary {
    pub steps: u32,
    /// Leftover fraction of a step, for render interpolation.
    pub alpha: f32,
    pub dropped: Duration,
}

pub struct Engine {
    rng: RngManager,
    grid: SpatialGrid,
    clock: FixedStep,
    systems: Vec<Box<dyn System>>,
    reaped: Vec<EntityIndex>,
    settings: EngineSettings,
}

impl Engine {
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut SpatialGrid {
        &mut self.grid
    }

    pub fn rng_stream(&mut self, name: &str) -> SystemRng<'_> {
        self.rng.stream(name)
    }

    /// Indices freed at the start of the last tick.
    pub fn last_reaped(&self) -> &[EntityIndex] {
        &self.reaped
    }

    /// Run exactly one fixed step.
    pub fn tick(&mut self, world: &mut World) -> Result<TickSummary> {
        let dt = self.settings.tick_seconds();
        let tick = world.tick();

        world.reap_dead(&mut self.reaped);
        for &idx in &self.reaped {
            self.grid.remove(idx);
        }

        let mut system_reports = Vec::with_capacity(self.systems.len());
        Self::run_stage(
            Stage::Integrate,
            &mut self.systems,
            &mut self.rng,
            &self.grid,
            &self.settings,
            tick,
            dt,
            world,
            &mut system_reports,
        )?;

        let grid_stats = self.grid.rebuild(world);

        Self::run_stage(
            Stage::Resolve,
            &mut self.systems,
            &mut self.rng,
            &self.grid,
            &self.settings,
            tick,
            dt,
            world,
            &mut system_reports,
        )?;

        world.advance_tick();
        trace!(tick, reaped = self.reaped.len(), "tick complete");
        Ok(TickSummary {
            tick,
            reaped: self.reaped.len(),
            grid: grid_stats,
            system_reports,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_stage(
        stage: Stage,
        systems: &mut [Box<dyn System>],
        rng: &mut RngManager,
        grid: &SpatialGrid,
        settings: &EngineSettings,
        tick: u64,
        dt: f32,
        world: &mut World,
        reports: &mut Vec<SystemRunReport>,
    ) -> Result<()> {
        let ctx = SystemContext {
            tick,
            dt,
            map_radius: settings.map_radius,
            defaults: &settings.defaults,
            grid,
        };
        for system in systems.iter_mut().filter(|s| s.stage() == stage) {
            let start = Instant::now();
            let mut rng_stream = rng.stream(system.name());
            system
                .run(&ctx, world, &mut rng_stream)
                .with_context(|| format!("system '{}' failed on tick {tick}", system.name()))?;
            reports.push(SystemRunReport {
                name: system.name().to_string(),
                duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
            });
        }
        Ok(())
    }

    /// Feed real elapsed time through the fixed-step accumulator and run as
    /// many ticks as it yields.
    pub fn advance(&mut self, world: &mut World, elapsed: Duration) -> Result<FrameSummary> {
        self.clock.accumulate(elapsed);
        let mut steps = 0;
        while self.clock.consume() {
            self.tick(world)?;
            steps += 1;
        }
        let dropped = self.clock.take_dropped();
        if !dropped.is_zero() {
            debug!(
                dropped_ms = dropped.as_secs_f64() * 1_000.0,
                "simulation fell behind; dropping excess time"
            );
        }
        Ok(FrameSummary {
            steps,
            alpha: self.clock.alpha(),
            dropped,
        })
    }

    pub fn run(&mut self, world: &mut World, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.tick(world)?;
        }
        Ok(())
    }
}
