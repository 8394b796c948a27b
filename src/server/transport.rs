//! The room's only view of the network: address one connection or all.

use std::collections::{BTreeMap, VecDeque};

pub type ConnectionId = u32;

pub trait Transport: Send {
    fn send(&mut self, conn: ConnectionId, bytes: &[u8]);
    fn broadcast(&mut self, bytes: &[u8]);
}

/// In-process transport: every open connection gets an outbox the caller
/// drains. Used by tests and the offline runner.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    outboxes: BTreeMap<ConnectionId, VecDeque<Vec<u8>>>,
    sent_bytes: u64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, conn: ConnectionId) {
        self.outboxes.entry(conn).or_default();
    }

    pub fn close(&mut self, conn: ConnectionId) {
        self.outboxes.remove(&conn);
    }

    pub fn pop(&mut self, conn: ConnectionId) -> Option<Vec<u8>> {
        self.outboxes.get_mut(&conn)?.pop_front()
    }

    /// Everything queued for `conn`, oldest first.
    pub fn drain(&mut self, conn: ConnectionId) -> Vec<Vec<u8>> {
        self.outboxes
            .get_mut(&conn)
            .map(|outbox| outbox.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn depth(&self, conn: ConnectionId) -> usize {
        self.outboxes.get(&conn).map_or(0, VecDeque::len)
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, conn: ConnectionId, bytes: &[u8]) {
        if let Some(outbox) = self.outboxes.get_mut(&conn) {
            outbox.push_back(bytes.to_vec());
            self.sent_bytes += bytes.len() as u64;
        }
    }

    fn broadcast(&mut self, bytes: &[u8]) {
        for outbox in self.outboxes.values_mut() {
            outbox.push_back(bytes.to_vec());
            self.sent_bytes += bytes.len() as u64;
        }
    }
}
