pub mod config;
pub mod ecs;
pub mod engine;
pub mod net;
pub mod protocol;
pub mod rng;
pub mod server;
pub mod snapshot;
pub mod spatial;
pub mod systems;

pub use config::{ArenaConfig, ConfigLoader};
pub use ecs::{EntityFlags, EntityIndex, World};
pub use engine::{Engine, EngineBuilder, EngineSettings, TickSummary};
