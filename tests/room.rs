use std::collections::VecDeque;

use arena_core::{
    config::ArenaConfig,
    ecs::EntityFlags,
    net::{ClientSession, SessionSettings},
    server::{ConnectionId, LoopbackTransport, Room},
    systems::Body,
};

fn quiet_arena() -> ArenaConfig {
    ArenaConfig {
        capacity: 256,
        bots: 0,
        food_target: 20,
        ..ArenaConfig::default()
    }
}

fn online_client(config: &ArenaConfig) -> ClientSession {
    let mut session = ClientSession::new(SessionSettings::from_config(config)).unwrap();
    session.connection_mut().connect().unwrap();
    session.connection_mut().opened().unwrap();
    session
}

fn deliver(room: &mut Room<LoopbackTransport>, conn: ConnectionId, session: &mut ClientSession) {
    for packet in room.transport_mut().drain(conn) {
        session.receive(&packet);
    }
    session.flush_inbound();
}

#[test]
fn prediction_converges_on_the_authoritative_state() {
    let config = quiet_arena();
    let mut transport = LoopbackTransport::new();
    transport.open(1);
    let mut room = Room::new(&config, transport).unwrap();
    let entity = room.on_join(1).unwrap();
    let mut session = online_client(&config);
    let dt = config.tick_seconds();

    for n in 0..90 {
        deliver(&mut room, 1, &mut session);
        let target_x = if n < 45 { 400.0 } else { -250.0 };
        if let Some(bytes) = session.step(target_x, 120.0, 0, dt) {
            room.on_message(1, bytes);
        }
        room.tick().unwrap();
    }
    deliver(&mut room, 1, &mut session);

    assert_eq!(session.server_id(), Some(entity as u16));
    assert_eq!(session.last_ack(), 90);
    // only the initial spawn correction
    assert!(session.predictor().snap_count() <= 1);
    assert_eq!(session.predictor().pending_len(), 0);
    assert_eq!(session.local_body(), Body::read(room.world(), entity));
    assert_eq!(room.rejected_packets(), 0);
    assert_eq!(session.rejected_packets(), 0);
}

fn target_at(n: u32) -> (f32, f32) {
    let angle = n as f32 * 0.05;
    (500.0 * angle.cos(), 350.0 * angle.sin())
}

#[test]
fn batched_inputs_are_stepped_one_by_one() {
    let config = quiet_arena();
    let mut transport = LoopbackTransport::new();
    transport.open(1);
    let mut room = Room::new(&config, transport).unwrap();
    let entity = room.on_join(1).unwrap();
    let mut session = online_client(&config);
    let dt = config.tick_seconds();

    let mut sent = 0;
    for round in 0..60 {
        deliver(&mut room, 1, &mut session);
        // two local steps land in one server tick, the next tick gets nothing
        for step in 0..2 {
            let (tx, ty) = target_at(round * 2 + step);
            if let Some(bytes) = session.step(tx, ty, 0, dt) {
                room.on_message(1, bytes);
                sent += 1;
            }
        }
        room.tick().unwrap();
        room.tick().unwrap();
    }
    deliver(&mut room, 1, &mut session);

    assert_eq!(sent, 120);
    assert_eq!(session.last_ack(), 120);
    assert_eq!(session.predictor().pending_len(), 0);
    assert!(session.predictor().snap_count() <= 1);
    assert_eq!(session.local_body(), Body::read(room.world(), entity));
}

#[test]
fn jittered_delivery_in_both_directions_converges() {
    let config = quiet_arena();
    let mut transport = LoopbackTransport::new();
    transport.open(1);
    let mut room = Room::new(&config, transport).unwrap();
    let entity = room.on_join(1).unwrap();
    let mut session = online_client(&config);
    let dt = config.tick_seconds();

    let mut in_flight: VecDeque<Vec<u8>> = VecDeque::new();
    for n in 0..150u32 {
        // server packets reach the client on two ticks out of three
        if n % 3 != 1 {
            deliver(&mut room, 1, &mut session);
        }
        let (tx, ty) = target_at(n);
        if let Some(bytes) = session.step(tx, ty, 0, dt) {
            in_flight.push_back(bytes.to_vec());
        }
        // client packets arrive in bursts of up to three, sometimes none
        let burst = [0, 2, 1, 3, 0][n as usize % 5];
        for _ in 0..burst {
            if let Some(packet) = in_flight.pop_front() {
                room.on_message(1, &packet);
            }
        }
        room.tick().unwrap();
    }
    while let Some(packet) = in_flight.pop_front() {
        room.on_message(1, &packet);
    }
    room.tick().unwrap();
    deliver(&mut room, 1, &mut session);

    assert_eq!(session.last_ack(), 150);
    assert_eq!(session.predictor().pending_len(), 0);
    assert!(session.predictor().snap_count() <= 1);
    assert_eq!(session.local_body(), Body::read(room.world(), entity));
    assert_eq!(room.rejected_packets(), 0);
}

#[test]
fn full_history_holds_inputs_until_the_server_catches_up() {
    let config = quiet_arena();
    let mut transport = LoopbackTransport::new();
    transport.open(1);
    let mut room = Room::new(&config, transport).unwrap();
    let entity = room.on_join(1).unwrap();
    let mut session = ClientSession::new(SessionSettings {
        history_capacity: 8,
        ..SessionSettings::from_config(&config)
    })
    .unwrap();
    session.connection_mut().connect().unwrap();
    session.connection_mut().opened().unwrap();
    let dt = config.tick_seconds();

    let mut held: Vec<Vec<u8>> = Vec::new();
    // the uplink is down for 20 ticks: only 8 steps fit in the history
    for n in 0..20u32 {
        let (tx, ty) = target_at(n);
        if let Some(bytes) = session.step(tx, ty, 0, dt) {
            held.push(bytes.to_vec());
        }
        room.tick().unwrap();
    }
    assert_eq!(held.len(), 8);
    assert!(session.predictor().is_full());
    assert_eq!(session.predictor().stall_count(), 12);

    for packet in &held {
        room.on_message(1, packet);
    }
    for n in 20..60u32 {
        room.tick().unwrap();
        deliver(&mut room, 1, &mut session);
        let (tx, ty) = target_at(n);
        if let Some(bytes) = session.step(tx, ty, 0, dt) {
            room.on_message(1, bytes);
        }
    }
    room.tick().unwrap();
    deliver(&mut room, 1, &mut session);

    assert_eq!(session.last_ack(), 48);
    assert_eq!(session.predictor().pending_len(), 0);
    assert!(session.predictor().snap_count() <= 1);
    assert_eq!(session.local_body(), Body::read(room.world(), entity));
}

#[test]
fn remote_entities_are_interpolated_and_dropped_on_leave() {
    let config = ArenaConfig {
        food_target: 0,
        ..quiet_arena()
    };
    let mut transport = LoopbackTransport::new();
    transport.open(1);
    transport.open(2);
    let mut room = Room::new(&config, transport).unwrap();
    room.on_join(1).unwrap();
    let other = room.on_join(2).unwrap() as u16;
    let mut session = online_client(&config);
    let dt = config.tick_seconds();

    for _ in 0..10 {
        deliver(&mut room, 1, &mut session);
        if let Some(bytes) = session.step(0.0, 0.0, 0, dt) {
            room.on_message(1, bytes);
        }
        room.tick().unwrap();
    }
    deliver(&mut room, 1, &mut session);
    assert!(session.remote(other).is_some());
    // our own entity is predicted, not interpolated
    assert_eq!(session.interpolator().len(), 1);

    room.on_leave(2);
    room.tick().unwrap();
    deliver(&mut room, 1, &mut session);
    assert!(session.remote(other).is_none());
}

#[test]
fn joining_a_full_world_waits_for_a_slot() {
    let config = ArenaConfig {
        capacity: 4,
        bots: 0,
        food_target: 3,
        ..ArenaConfig::default()
    };
    let mut room = Room::new(&config, LoopbackTransport::new()).unwrap();
    assert!(room.on_join(1).is_some());
    assert!(room.on_join(2).is_none());

    room.on_leave(1);
    room.tick().unwrap();
    let entity = room.entity_of(2).unwrap();
    assert!(room.world().flags(entity).is_player());
    assert_eq!(room.world().count_matching(EntityFlags::FOOD), 3);
}
