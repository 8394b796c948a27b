//! Client session: owns the predicted local entity and the interpolated view
//! of everything else.
//!
//! Packets are buffered by [`ClientSession::receive`] and only applied in
//! [`ClientSession::flush_inbound`], which the caller runs before each local
//! step so prediction never observes a half-applied snapshot.

use std::collections::VecDeque;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::{
    config::{ArenaConfig, EngineDefaults},
    ecs::{EntityFlags, EntityIndex, World},
    protocol::{self, MessageType, ProtocolError},
    server::spawn::PLAYER_RADIUS,
    systems::Body,
};

use super::{
    connection::{Connection, RetryPolicy},
    interpolation::{Interpolator, Sample},
    predictor::{Predictor, DEFAULT_HISTORY_CAPACITY},
};

/// Packets held between flushes; the oldest is dropped beyond it.
pub const DEFAULT_INBOUND_CAPACITY: usize = 64;

/// How fast the server clock offset follows a later-than-usual arrival.
/// Earlier arrivals are taken immediately.
const OFFSET_SMOOTHING: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub map_radius: f32,
    pub defaults: EngineDefaults,
    /// Radius of the local entity; must match the server's player archetype.
    pub radius: f32,
    pub history_capacity: usize,
    pub inbound_capacity: usize,
    pub retry: RetryPolicy,
}

impl SessionSettings {
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self {
            map_radius: config.map_radius,
            defaults: config.defaults,
            ..Self::default()
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        let config = ArenaConfig::default();
        Self {
            map_radius: config.map_radius,
            defaults: config.defaults,
            radius: PLAYER_RADIUS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct ClientSession {
    settings: SessionSettings,
    world: World,
    local: EntityIndex,
    server_id: Option<u16>,
    last_ack: u32,
    connection: Connection,
    predictor: Predictor,
    interpolator: Interpolator,
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<u8>,
    clock: f64,
    server_offset: Option<f64>,
    rejected_packets: u64,
}

impl ClientSession {
    pub fn new(settings: SessionSettings) -> Result<Self> {
        let mut world = World::new(1);
        let local = world
            .spawn(EntityFlags::PLAYER | EntityFlags::LOCAL)
            .context("client world has no slot for the local entity")?;
        world.transform.set(local, 0.0, 0.0, 0.0, 1.0);
        world.physics.set(local, 0.0, 0.0, 1.0, settings.radius, 0.0);
        world.config.clear_entity(local);
        world.input.set(local, 0.0, 0.0, 0);

        Ok(Self {
            world,
            local,
            server_id: None,
            last_ack: 0,
            connection: Connection::new(settings.retry),
            predictor: Predictor::with_capacity(
                settings.map_radius,
                settings.defaults,
                settings.history_capacity,
            ),
            interpolator: Interpolator::new(),
            inbound: VecDeque::with_capacity(settings.inbound_capacity),
            outbound: Vec::with_capacity(protocol::HEADER_LEN + protocol::INPUT_RECORD_LEN),
            clock: 0.0,
            server_offset: None,
            rejected_packets: 0,
            settings,
        })
    }

    /// Buffer a packet for the next [`flush_inbound`](Self::flush_inbound).
    pub fn receive(&mut self, bytes: &[u8]) {
        if self.inbound.len() >= self.settings.inbound_capacity.max(1) {
            self.inbound.pop_front();
            debug!("inbound buffer full, dropping oldest packet");
        }
        self.inbound.push_back(bytes.to_vec());
    }

    /// Apply every buffered packet in arrival order. Returns how many applied.
    pub fn flush_inbound(&mut self) -> usize {
        let mut applied = 0;
        while let Some(packet) = self.inbound.pop_front() {
            match self.apply_packet(&packet) {
                Ok(()) => applied += 1,
                Err(err) => {
                    self.rejected_packets += 1;
                    warn!(error = %err, "dropping server packet");
                }
            }
        }
        applied
    }

    fn apply_packet(&mut self, packet: &[u8]) -> Result<(), ProtocolError> {
        let header = protocol::read_header(packet)?;
        match header.kind {
            MessageType::InputAck => {
                let (_, ack) = protocol::decode_ack(packet)?;
                if self.server_id != Some(ack.entity) {
                    debug!(entity = ack.entity, "server assigned local entity");
                    self.server_id = Some(ack.entity);
                    self.interpolator.set_local(Some(ack.entity));
                }
                self.last_ack = ack.last_processed;
                Ok(())
            }
            MessageType::IndexedSnapshot => {
                let now = self.server_to_local(header.timestamp);
                let local_id = self.server_id;
                let interpolator = &mut self.interpolator;
                let mut baseline = None;

                interpolator.begin_snapshot();
                protocol::unpack_and_apply(packet, |id, x, y, vx, vy| {
                    if Some(id) == local_id {
                        baseline = Some(Body::new(x, y, vx, vy));
                    } else {
                        interpolator.push(
                            id,
                            Sample {
                                time: now,
                                x,
                                y,
                                vx,
                                vy,
                            },
                        );
                    }
                })?;
                interpolator.prune_stale();

                if let Some(baseline) = baseline {
                    self.predictor
                        .reconcile(&mut self.world, self.local, baseline, self.last_ack);
                }
                Ok(())
            }
            found => Err(ProtocolError::UnexpectedType {
                expected: MessageType::IndexedSnapshot,
                found,
            }),
        }
    }

    /// Map a server timestamp onto the local clock.
    ///
    /// The offset tracks the fastest delivery seen, so remote samples keep the
    /// server's spacing instead of the network's arrival jitter. Stamps never
    /// run ahead of the local clock and never go backwards.
    fn server_to_local(&mut self, server_time: f32) -> f64 {
        let server_time = f64::from(server_time);
        let observed = self.clock - server_time;
        let offset = match self.server_offset {
            Some(offset) if observed > offset => offset + (observed - offset) * OFFSET_SMOOTHING,
            _ => observed,
        };
        self.server_offset = Some(offset);
        server_time + offset
    }

    /// Advance the local clock and, when online, predict one step and return
    /// the encoded input to send. Nothing is sent while the prediction
    /// history is full.
    pub fn step(&mut self, target_x: f32, target_y: f32, flags: u8, dt: f32) -> Option<&[u8]> {
        self.clock += f64::from(dt);
        if !self.connection.is_online() {
            return None;
        }
        let input = self
            .predictor
            .predict(&mut self.world, self.local, target_x, target_y, flags, dt)?;
        protocol::encode_input(&input, self.clock as f32, &mut self.outbound);
        Some(&self.outbound)
    }

    /// Interpolated state of a remote entity at the current clock.
    pub fn remote(&self, id: u16) -> Option<Sample> {
        self.interpolator.sample(id, self.clock)
    }

    pub fn local_body(&self) -> Body {
        Body::read(&self.world, self.local)
    }

    pub fn local_entity(&self) -> EntityIndex {
        self.local
    }

    pub fn server_id(&self) -> Option<u16> {
        self.server_id
    }

    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    pub fn rejected_packets(&self) -> u64 {
        self.rejected_packets
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Estimated local-minus-server clock offset, once a snapshot arrived.
    pub fn server_offset(&self) -> Option<f64> {
        self.server_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        net::INTERPOLATION_DELAY,
        protocol::{EntityState, InputAck},
    };

    fn online_session() -> ClientSession {
        let mut session = ClientSession::new(SessionSettings::default()).unwrap();
        session.connection_mut().connect().unwrap();
        session.connection_mut().opened().unwrap();
        session
    }

    #[test]
    fn offline_session_does_not_predict() {
        let mut session = ClientSession::new(SessionSettings::default()).unwrap();
        assert!(session.step(100.0, 0.0, 0, 1.0 / 60.0).is_none());
        assert_eq!(session.predictor().pending_len(), 0);
    }

    #[test]
    fn packets_wait_for_flush() {
        let mut session = online_session();
        let mut out = Vec::new();
        protocol::encode_ack(
            &InputAck {
                entity: 4,
                last_processed: 0,
            },
            0.0,
            &mut out,
        );
        session.receive(&out);
        assert_eq!(session.server_id(), None);
        assert_eq!(session.pending_inbound(), 1);

        assert_eq!(session.flush_inbound(), 1);
        assert_eq!(session.server_id(), Some(4));
    }

    #[test]
    fn snapshot_snaps_local_and_tracks_remotes() {
        let mut session = online_session();
        let mut out = Vec::new();
        protocol::encode_ack(
            &InputAck {
                entity: 4,
                last_processed: 0,
            },
            0.0,
            &mut out,
        );
        session.receive(&out);

        let far = EntityState {
            x: 500.0,
            y: -300.0,
            vx: 0.0,
            vy: 0.0,
        };
        protocol::pack_indexed(&[(4, far), (9, EntityState::default())], 0.0, &mut out).unwrap();
        session.receive(&out);
        session.flush_inbound();

        let local = session.local_body();
        assert_eq!((local.x, local.y), (500.0, -300.0));
        assert_eq!(session.predictor().snap_count(), 1);
        assert!(session.remote(9).is_some());
        assert!(session.remote(4).is_none());
    }

    #[test]
    fn remote_samples_follow_server_time_not_arrival() {
        let mut session = ClientSession::new(SessionSettings::default()).unwrap();
        let mut out = Vec::new();
        // server sends every 0.1s with entity 9 moving 100 units/s; arrivals
        // jitter between 50ms and 90ms
        let arrivals = [0.05, 0.09, 0.05, 0.09];
        for (k, late) in arrivals.iter().enumerate() {
            let server_time = 0.1 * (k + 1) as f64;
            let state = EntityState {
                x: (server_time * 100.0) as f32,
                y: 0.0,
                vx: 100.0,
                vy: 0.0,
            };
            protocol::pack_indexed(&[(9, state)], server_time as f32, &mut out).unwrap();
            session.step(0.0, 0.0, 0, (server_time + late - session.clock()) as f32);
            session.receive(&out);
            session.flush_inbound();
        }

        let offset = session.server_offset().unwrap();
        assert!((0.049..0.06).contains(&offset), "offset {offset}");

        // render time now - 0.1 maps back to server time now - 0.1 - offset
        let server_time = session.clock() - INTERPOLATION_DELAY - offset;
        let x = session.remote(9).unwrap().x;
        assert!((f64::from(x) - server_time * 100.0).abs() < 0.3, "x {x}");
    }

    #[test]
    fn garbage_is_counted_and_skipped() {
        let mut session = online_session();
        session.receive(&[1, 2, 3]);
        assert_eq!(session.flush_inbound(), 0);
        assert_eq!(session.rejected_packets(), 1);
    }
}
