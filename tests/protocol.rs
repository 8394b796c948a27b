use arena_core::{
    ecs::{EntityFlags, World},
    protocol::{
        decode_input, encode_input, pack_indexed, pack_snapshot, read_header, unpack_and_apply,
        EntityState, InputMessage, MessageType, ProtocolError, HEADER_LEN, INDEXED_RECORD_LEN,
    },
};

fn unpack_all(data: &[u8]) -> Result<Vec<(u16, EntityState)>, ProtocolError> {
    let mut records = Vec::new();
    unpack_and_apply(data, |id, x, y, vx, vy| {
        records.push((id, EntityState { x, y, vx, vy }))
    })?;
    Ok(records)
}

#[test]
fn edge_floats_survive_bit_exact() {
    let values = [0.0_f32, -0.0, 1e6, 1e-6];
    let records: Vec<_> = values
        .iter()
        .enumerate()
        .map(|(n, &v)| {
            (
                n as u16,
                EntityState {
                    x: v,
                    y: -v,
                    vx: v,
                    vy: v,
                },
            )
        })
        .collect();

    let mut out = Vec::new();
    pack_indexed(&records, 12.5, &mut out).unwrap();
    let decoded = unpack_all(&out).unwrap();

    assert_eq!(decoded.len(), values.len());
    for ((id, state), (expected_id, expected)) in decoded.iter().zip(&records) {
        assert_eq!(id, expected_id);
        assert_eq!(state.x.to_bits(), expected.x.to_bits());
        assert_eq!(state.y.to_bits(), expected.y.to_bits());
        assert_eq!(state.vx.to_bits(), expected.vx.to_bits());
        assert_eq!(state.vy.to_bits(), expected.vy.to_bits());
    }
    assert_eq!(read_header(&out).unwrap().timestamp, 12.5);
}

#[test]
fn world_snapshot_round_trip() {
    let mut world = World::new(16);
    let mut expected = Vec::new();
    for n in 0..5 {
        let id = world.spawn(EntityFlags::FOOD).unwrap();
        world.transform.set(id, n as f32, -(n as f32), 0.0, 1.0);
        world.physics.set(id, 0.25 * n as f32, 0.0, 1.0, 5.0, 0.9);
        expected.push(id as u16);
    }

    let mut out = Vec::new();
    let count = pack_snapshot(&world, 0.0, &mut out).unwrap();
    assert_eq!(count, 5);
    assert_eq!(out.len(), HEADER_LEN + 5 * INDEXED_RECORD_LEN);

    let decoded = unpack_all(&out).unwrap();
    let ids: Vec<_> = decoded.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, expected);
    assert_eq!(decoded[3].1.x, 3.0);
    assert_eq!(decoded[3].1.vx, 0.75);
}

#[test]
fn rejects_bad_magic_version_and_length() {
    let mut out = Vec::new();
    pack_indexed(&[(1, EntityState::default())], 0.0, &mut out).unwrap();

    let mut bad_magic = out.clone();
    bad_magic[0] = 0x5A;
    assert_eq!(unpack_all(&bad_magic), Err(ProtocolError::BadMagic(0x5A)));

    let mut bad_version = out.clone();
    bad_version[1] = 2;
    assert_eq!(
        unpack_all(&bad_version),
        Err(ProtocolError::UnsupportedVersion(2))
    );

    let mut overlong = out.clone();
    overlong[4..6].copy_from_slice(&3u16.to_le_bytes());
    assert!(matches!(
        unpack_all(&overlong),
        Err(ProtocolError::Truncated { .. })
    ));

    assert!(matches!(
        unpack_all(&out[..HEADER_LEN - 1]),
        Err(ProtocolError::Truncated { .. })
    ));
}

#[test]
fn input_messages_are_single_record() {
    let mut out = Vec::new();
    encode_input(
        &InputMessage {
            seq: 3,
            target_x: 1.0,
            target_y: 2.0,
            flags: 0,
        },
        0.0,
        &mut out,
    );
    assert_eq!(read_header(&out).unwrap().kind, MessageType::Input);

    out[4..6].copy_from_slice(&0u16.to_le_bytes());
    assert!(matches!(
        decode_input(&out),
        Err(ProtocolError::BadRecordCount { count: 0, .. })
    ));
}
