//! One authoritative arena: a world, its engine and the connected clients.
//!
//! Network callbacks only buffer. Everything touching the world happens in
//! [`Room::tick`], so a tick always sees a consistent input set.

use std::collections::{BTreeMap, VecDeque};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{
    config::ArenaConfig,
    ecs::{EntityFlags, EntityIndex, World},
    engine::{Engine, EngineBuilder, EngineSettings, TickSummary},
    protocol::{self, InputAck, InputMessage},
    snapshot::SnapshotWriter,
    systems::{MovementSystem, SteeringTarget},
};

use super::{
    spawn::{random_shape, spawn_bot, spawn_food, spawn_player, spawn_point},
    transport::{ConnectionId, Transport},
};

/// Inputs buffered per client between ticks; the oldest is dropped beyond it.
pub const DEFAULT_INBOX_CAPACITY: usize = 32;

const SPAWN_STREAM: &str = "spawn";

#[derive(Debug, Clone)]
pub struct RoomSettings {
    pub name: String,
    pub bots: usize,
    pub food_target: usize,
    pub inbox_capacity: usize,
}

impl RoomSettings {
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            name: config.name.clone(),
            bots: config.bots,
            food_target: config.food_target,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct Client {
    entity: Option<EntityIndex>,
    inbox: VecDeque<InputMessage>,
    last_seq: u32,
}

pub struct Room<T: Transport> {
    settings: RoomSettings,
    world: World,
    engine: Engine,
    transport: T,
    clients: BTreeMap<ConnectionId, Client>,
    snapshot_writer: Option<SnapshotWriter>,
    packet_buf: Vec<u8>,
    ack_buf: Vec<u8>,
    rejected_packets: u64,
}

impl<T: Transport> Room<T> {
    pub fn new(config: &ArenaConfig, transport: T) -> Result<Self> {
        config.validate().context("Invalid arena config")?;
        let engine = EngineBuilder::new(EngineSettings::from_config(config))
            .with_default_systems()
            .build();
        let mut room = Self {
            settings: RoomSettings::from_config(config),
            world: World::new(config.capacity),
            engine,
            transport,
            clients: BTreeMap::new(),
            snapshot_writer: None,
            packet_buf: Vec::with_capacity(
                protocol::HEADER_LEN + config.capacity * protocol::INDEXED_RECORD_LEN,
            ),
            ack_buf: Vec::with_capacity(protocol::HEADER_LEN + protocol::ACK_RECORD_LEN),
            rejected_packets: 0,
        };
        room.populate();
        info!(
            arena = %room.settings.name,
            bots = room.world.count_matching(EntityFlags::BOT),
            food = room.world.count_matching(EntityFlags::FOOD),
            "room ready"
        );
        Ok(room)
    }

    pub fn with_snapshot_writer(mut self, writer: SnapshotWriter) -> Self {
        self.snapshot_writer = Some(writer);
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Entity currently controlled by `conn`.
    pub fn entity_of(&self, conn: ConnectionId) -> Option<EntityIndex> {
        self.clients.get(&conn)?.entity
    }

    pub fn rejected_packets(&self) -> u64 {
        self.rejected_packets
    }

    /// Server time in seconds, derived from the tick counter.
    pub fn time(&self) -> f32 {
        self.world.tick() as f32 * self.engine.settings().tick_seconds()
    }

    fn populate(&mut self) {
        let map_radius = self.engine.settings().map_radius;
        let mut rng = self.engine.rng_stream(SPAWN_STREAM);
        for _ in 0..self.settings.bots {
            let (x, y) = spawn_point(&mut rng, map_radius);
            let shape = random_shape(&mut rng);
            if spawn_bot(&mut self.world, x, y, shape).is_none() {
                warn!("world full while spawning bots");
                break;
            }
        }
        self.top_up_food();
    }

    fn top_up_food(&mut self) -> usize {
        let live = self.world.count_matching(EntityFlags::FOOD);
        let missing = self.settings.food_target.saturating_sub(live);
        let map_radius = self.engine.settings().map_radius;
        let mut rng = self.engine.rng_stream(SPAWN_STREAM);
        let mut spawned = 0;
        for _ in 0..missing {
            let (x, y) = spawn_point(&mut rng, map_radius);
            if spawn_food(&mut self.world, x, y).is_none() {
                debug!(missing = missing - spawned, "world full, food top-up deferred");
                break;
            }
            spawned += 1;
        }
        spawned
    }

    fn spawn_client_entity(&mut self) -> Option<EntityIndex> {
        let map_radius = self.engine.settings().map_radius;
        let mut rng = self.engine.rng_stream(SPAWN_STREAM);
        let (x, y) = spawn_point(&mut rng, map_radius);
        let shape = random_shape(&mut rng);
        let id = spawn_player(&mut self.world, x, y, shape)?;
        self.world.insert_flags(id, EntityFlags::INPUT_DRIVEN);
        Some(id)
    }

    /// A connection joined. Returns its entity, or `None` when the world is
    /// full; the spawn is retried every tick until it succeeds.
    pub fn on_join(&mut self, conn: ConnectionId) -> Option<EntityIndex> {
        if self.clients.contains_key(&conn) {
            warn!(conn, "duplicate join ignored");
            return self.entity_of(conn);
        }
        let entity = self.spawn_client_entity();
        match entity {
            Some(id) => info!(conn, entity = id, "client joined"),
            None => warn!(conn, "client joined but the world is full"),
        }
        self.clients.insert(
            conn,
            Client {
                entity,
                inbox: VecDeque::with_capacity(self.settings.inbox_capacity),
                last_seq: 0,
            },
        );
        entity
    }

    /// A connection left; its entity dies and is reaped next tick.
    pub fn on_leave(&mut self, conn: ConnectionId) {
        let Some(client) = self.clients.remove(&conn) else {
            return;
        };
        if let Some(id) = client.entity {
            self.world.mark_dead(id);
        }
        info!(conn, entity = ?client.entity, "client left");
    }

    /// Buffer an inbound packet. Malformed packets are dropped and counted.
    pub fn on_message(&mut self, conn: ConnectionId, bytes: &[u8]) {
        let Some(client) = self.clients.get_mut(&conn) else {
            debug!(conn, "message from unknown connection");
            return;
        };
        match protocol::decode_input(bytes) {
            Ok((_, input)) => {
                if client.inbox.len() == self.settings.inbox_capacity {
                    client.inbox.pop_front();
                }
                client.inbox.push_back(input);
            }
            Err(err) => {
                self.rejected_packets += 1;
                warn!(conn, error = %err, "rejected packet");
            }
        }
    }

    /// Apply buffered inputs in seq order, one movement and physics step
    /// each, so the state acked for a seq is the state the client predicted
    /// for it. The skill bit is sticky across the batch; stale or replayed
    /// seqs are ignored.
    fn flush_inputs(&mut self) {
        let settings = self.engine.settings();
        let dt = settings.tick_seconds();
        for client in self.clients.values_mut() {
            let Some(id) = client.entity else {
                client.inbox.clear();
                continue;
            };
            if !self.world.is_alive(id) {
                client.inbox.clear();
                continue;
            }
            let mut skill = false;
            while let Some(input) = client.inbox.pop_front() {
                if input.seq <= client.last_seq {
                    continue;
                }
                client.last_seq = input.seq;
                let target = SteeringTarget {
                    x: input.target_x,
                    y: input.target_y,
                };
                MovementSystem::step_input(
                    &mut self.world,
                    id,
                    target,
                    settings.map_radius,
                    &settings.defaults,
                    dt,
                );
                skill |= input.skill();
            }
            if skill {
                self.world.input.set_skill_active(id, true);
            }
            self.world.input.set_last_seq(id, client.last_seq);
        }
    }

    fn respawn_dead_players(&mut self) {
        let conns: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.entity.map_or(true, |id| !self.world.is_alive(id)))
            .map(|(&conn, _)| conn)
            .collect();
        for conn in conns {
            let entity = self.spawn_client_entity();
            if let Some(client) = self.clients.get_mut(&conn) {
                if entity.is_some() {
                    debug!(conn, entity = ?entity, "client respawned");
                }
                client.entity = entity;
            }
        }
    }

    /// Run one authoritative step and publish its result.
    pub fn tick(&mut self) -> Result<TickSummary> {
        self.flush_inputs();
        let summary = self.engine.tick(&mut self.world)?;
        self.respawn_dead_players();
        self.top_up_food();

        let timestamp = self.time();
        for (&conn, client) in &self.clients {
            let Some(id) = client.entity else {
                continue;
            };
            let ack = InputAck {
                entity: id as u16,
                last_processed: client.last_seq,
            };
            protocol::encode_ack(&ack, timestamp, &mut self.ack_buf);
            self.transport.send(conn, &self.ack_buf);
        }

        protocol::pack_snapshot(&self.world, timestamp, &mut self.packet_buf)
            .context("Failed to pack snapshot")?;
        self.transport.broadcast(&self.packet_buf);

        if let Some(writer) = &self.snapshot_writer {
            if let Some(path) = writer.maybe_write(&self.world)? {
                debug!(path = %path.display(), "world dump written");
            }
        }
        Ok(summary)
    }

    pub fn run(&mut self, ticks: u64) -> Result<()> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }
}
