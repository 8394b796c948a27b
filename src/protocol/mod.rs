//! Binary wire format shared by server and client.
//!
//! Every message starts with the same little-endian header:
//!
//! ```text
//! [magic: u8 = 0xA5][version: u8 = 1][type: u16][count: u16][timestamp: f32]
//! ```
//!
//! followed by `count` fixed-layout records. Readers validate the header and
//! the declared length against the buffer before touching any record, so a
//! malformed packet is rejected without partially applying anything.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::ecs::{actions, World};

pub const MAGIC: u8 = 0xA5;
pub const VERSION: u8 = 1;
pub const HEADER_LEN: usize = 10;

/// `id: u16` plus four `f32`.
pub const INDEXED_RECORD_LEN: usize = 2 + 4 * 4;
/// `seq: u32, target_x: f32, target_y: f32, flags: u8`.
pub const INPUT_RECORD_LEN: usize = 4 + 4 + 4 + 1;
/// `id: u16, last_processed: u32`.
pub const ACK_RECORD_LEN: usize = 2 + 4;

/// Named records carry their length in a `u8`.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Input flag bits; the same bits the input store uses.
pub mod input_flags {
    pub const SKILL: u8 = super::actions::SKILL;
    pub const EJECT: u8 = super::actions::EJECT;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageType {
    IndexedSnapshot = 1,
    NamedSnapshot = 2,
    Input = 3,
    InputAck = 4,
}

impl MessageType {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::IndexedSnapshot),
            2 => Some(Self::NamedSnapshot),
            3 => Some(Self::Input),
            4 => Some(Self::InputAck),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("packet truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("bad magic byte {0:#04x}")]
    BadMagic(u8),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message type {0}")]
    UnknownType(u16),
    #[error("expected {expected:?} message, got {found:?}")]
    UnexpectedType {
        expected: MessageType,
        found: MessageType,
    },
    #[error("{0} records do not fit a u16 count")]
    TooManyRecords(usize),
    #[error("entity index {0} does not fit the wire id")]
    IdOutOfRange(usize),
    #[error("name of {0} bytes exceeds {MAX_NAME_LEN}")]
    NameTooLong(usize),
    #[error("name is not ascii")]
    NonAsciiName,
    #[error("{kind:?} message must carry exactly one record, got {count}")]
    BadRecordCount { kind: MessageType, count: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub kind: MessageType,
    pub count: u16,
    pub timestamp: f32,
}

/// Kinematic payload of one snapshot record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntityState {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

/// Client to server: one local step's input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputMessage {
    pub seq: u32,
    pub target_x: f32,
    pub target_y: f32,
    pub flags: u8,
}

impl InputMessage {
    pub fn skill(&self) -> bool {
        self.flags & input_flags::SKILL != 0
    }

    pub fn eject(&self) -> bool {
        self.flags & input_flags::EJECT != 0
    }
}

/// Server to client: the entity a connection controls and the newest input
/// seq the server has applied for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAck {
    pub entity: u16,
    pub last_processed: u32,
}

fn put_header(out: &mut Vec<u8>, kind: MessageType, count: u16, timestamp: f32) {
    out.put_u8(MAGIC);
    out.put_u8(VERSION);
    out.put_u16_le(kind as u16);
    out.put_u16_le(count);
    out.put_f32_le(timestamp);
}

fn put_state(out: &mut Vec<u8>, state: &EntityState) {
    out.put_f32_le(state.x);
    out.put_f32_le(state.y);
    out.put_f32_le(state.vx);
    out.put_f32_le(state.vy);
}

fn get_state(buf: &mut &[u8]) -> EntityState {
    EntityState {
        x: buf.get_f32_le(),
        y: buf.get_f32_le(),
        vx: buf.get_f32_le(),
        vy: buf.get_f32_le(),
    }
}

fn count_u16(count: usize) -> Result<u16, ProtocolError> {
    u16::try_from(count).map_err(|_| ProtocolError::TooManyRecords(count))
}

/// Validate magic, version and type.
pub fn read_header(data: &[u8]) -> Result<Header, ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: data.len(),
        });
    }
    let mut buf = &data[..HEADER_LEN];
    let magic = buf.get_u8();
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }
    let version = buf.get_u8();
    if version != VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    let raw_kind = buf.get_u16_le();
    let kind = MessageType::from_u16(raw_kind).ok_or(ProtocolError::UnknownType(raw_kind))?;
    Ok(Header {
        kind,
        count: buf.get_u16_le(),
        timestamp: buf.get_f32_le(),
    })
}

/// Header plus a check that `count` fixed-size records fit the buffer.
fn read_fixed(
    data: &[u8],
    expected: MessageType,
    record_len: usize,
) -> Result<(Header, &[u8]), ProtocolError> {
    let header = read_header(data)?;
    if header.kind != expected {
        return Err(ProtocolError::UnexpectedType {
            expected,
            found: header.kind,
        });
    }
    let needed = HEADER_LEN + usize::from(header.count) * record_len;
    if data.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            available: data.len(),
        });
    }
    Ok((header, &data[HEADER_LEN..needed]))
}

/// Pack every live entity of `world` as an indexed snapshot into `out`.
///
/// `out` is cleared and reused; no other allocation happens once it has
/// grown to fit. Returns the number of records written.
pub fn pack_snapshot(world: &World, timestamp: f32, out: &mut Vec<u8>) -> Result<u16, ProtocolError> {
    out.clear();
    put_header(out, MessageType::IndexedSnapshot, 0, timestamp);

    let mut count = 0usize;
    for id in 0..world.capacity() {
        if !world.is_alive(id) {
            continue;
        }
        let wire_id = u16::try_from(id).map_err(|_| ProtocolError::IdOutOfRange(id))?;
        let (x, y) = world.transform.position(id);
        let (vx, vy) = world.physics.velocity(id);
        out.put_u16_le(wire_id);
        put_state(out, &EntityState { x, y, vx, vy });
        count += 1;
    }

    let count = count_u16(count)?;
    out[4..6].copy_from_slice(&count.to_le_bytes());
    Ok(count)
}

/// Pack explicit `(id, state)` records as an indexed snapshot.
pub fn pack_indexed(
    records: &[(u16, EntityState)],
    timestamp: f32,
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    let count = count_u16(records.len())?;
    out.clear();
    out.reserve(HEADER_LEN + records.len() * INDEXED_RECORD_LEN);
    put_header(out, MessageType::IndexedSnapshot, count, timestamp);
    for (id, state) in records {
        out.put_u16_le(*id);
        put_state(out, state);
    }
    Ok(())
}

/// Pack `(name, state)` records. Names must be ascii and at most 255 bytes.
pub fn pack_named(
    records: &[(&str, EntityState)],
    timestamp: f32,
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    let count = count_u16(records.len())?;
    for (name, _) in records {
        if name.len() > MAX_NAME_LEN {
            return Err(ProtocolError::NameTooLong(name.len()));
        }
        if !name.is_ascii() {
            return Err(ProtocolError::NonAsciiName);
        }
    }
    out.clear();
    put_header(out, MessageType::NamedSnapshot, count, timestamp);
    for (name, state) in records {
        out.put_u8(name.len() as u8);
        out.put_slice(name.as_bytes());
        put_state(out, state);
    }
    Ok(())
}

/// Parse an indexed snapshot, calling `apply(id, x, y, vx, vy)` per record.
///
/// Nothing is applied unless the whole packet validates.
pub fn unpack_and_apply(
    data: &[u8],
    mut apply: impl FnMut(u16, f32, f32, f32, f32),
) -> Result<Header, ProtocolError> {
    let (header, mut body) = read_fixed(data, MessageType::IndexedSnapshot, INDEXED_RECORD_LEN)?;
    for _ in 0..header.count {
        let id = body.get_u16_le();
        let state = get_state(&mut body);
        apply(id, state.x, state.y, state.vx, state.vy);
    }
    Ok(header)
}

/// Parse a named snapshot, calling `apply(name, x, y, vx, vy)` per record.
/// The name borrows from `data`.
///
/// Records are variable length, so the whole packet is walked once for
/// validation before the first callback.
pub fn unpack_named_and_apply(
    data: &[u8],
    mut apply: impl FnMut(&str, f32, f32, f32, f32),
) -> Result<Header, ProtocolError> {
    let header = read_header(data)?;
    if header.kind != MessageType::NamedSnapshot {
        return Err(ProtocolError::UnexpectedType {
            expected: MessageType::NamedSnapshot,
            found: header.kind,
        });
    }

    let mut offset = HEADER_LEN;
    for _ in 0..header.count {
        let len = usize::from(*data.get(offset).ok_or(ProtocolError::Truncated {
            needed: offset + 1,
            available: data.len(),
        })?);
        let end = offset + 1 + len + 16;
        if data.len() < end {
            return Err(ProtocolError::Truncated {
                needed: end,
                available: data.len(),
            });
        }
        if !data[offset + 1..offset + 1 + len].is_ascii() {
            return Err(ProtocolError::NonAsciiName);
        }
        offset = end;
    }

    let mut body = &data[HEADER_LEN..offset];
    for _ in 0..header.count {
        let len = usize::from(body.get_u8());
        let (name, rest) = body.split_at(len);
        let name = std::str::from_utf8(name).map_err(|_| ProtocolError::NonAsciiName)?;
        body = rest;
        let state = get_state(&mut body);
        apply(name, state.x, state.y, state.vx, state.vy);
    }
    Ok(header)
}

pub fn encode_input(input: &InputMessage, timestamp: f32, out: &mut Vec<u8>) {
    out.clear();
    put_header(out, MessageType::Input, 1, timestamp);
    out.put_u32_le(input.seq);
    out.put_f32_le(input.target_x);
    out.put_f32_le(input.target_y);
    out.put_u8(input.flags);
}

pub fn decode_input(data: &[u8]) -> Result<(Header, InputMessage), ProtocolError> {
    let (header, mut body) = read_single(data, MessageType::Input, INPUT_RECORD_LEN)?;
    let input = InputMessage {
        seq: body.get_u32_le(),
        target_x: body.get_f32_le(),
        target_y: body.get_f32_le(),
        flags: body.get_u8(),
    };
    Ok((header, input))
}

pub fn encode_ack(ack: &InputAck, timestamp: f32, out: &mut Vec<u8>) {
    out.clear();
    put_header(out, MessageType::InputAck, 1, timestamp);
    out.put_u16_le(ack.entity);
    out.put_u32_le(ack.last_processed);
}

pub fn decode_ack(data: &[u8]) -> Result<(Header, InputAck), ProtocolError> {
    let (header, mut body) = read_single(data, MessageType::InputAck, ACK_RECORD_LEN)?;
    let ack = InputAck {
        entity: body.get_u16_le(),
        last_processed: body.get_u32_le(),
    };
    Ok((header, ack))
}

fn read_single(
    data: &[u8],
    kind: MessageType,
    record_len: usize,
) -> Result<(Header, &[u8]), ProtocolError> {
    let (header, body) = read_fixed(data, kind, record_len)?;
    if header.count != 1 {
        return Err(ProtocolError::BadRecordCount {
            kind,
            count: header.count,
        });
    }
    Ok((header, body))
}
