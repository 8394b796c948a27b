//! Authoritative server side: rooms, archetype spawns and the transport seam.

mod room;
pub mod spawn;
mod transport;

pub use room::{Room, RoomSettings, DEFAULT_INBOX_CAPACITY};
pub use transport::{ConnectionId, LoopbackTransport, Transport};
