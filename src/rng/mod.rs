//! Deterministic random number generation
//!
//! Each consumer draws from its own named ChaCha stream. A stream's seed is
//! derived from the master seed and the stream name, so adding a consumer
//! never shifts the numbers another one sees.

use std::collections::HashMap;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub struct RngManager {
    master_seed: u64,
    streams: HashMap<String, ChaCha8Rng>,
}

impl RngManager {
    pub fn new(seed: u64) -> Self {
        Self {
            master_seed: seed,
            streams: HashMap::new(),
        }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn stream(&mut self, name: &str) -> SystemRng<'_> {
        let seed = derive_seed(self.master_seed, name);
        let entry = self
            .streams
            .entry(name.to_string())
            .or_insert_with(|| ChaCha8Rng::seed_from_u64(seed));
        SystemRng { inner: entry }
    }

    /// Drop every stream; the next draw restarts each one from its seed.
    pub fn reset(&mut self) {
        self.streams.clear();
    }
}

impl Default for RngManager {
    fn default() -> Self {
        Self::new(42)
    }
}

/// FNV-1a over the stream name, mixed into the master seed.
fn derive_seed(master_seed: u64, name: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    master_seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407)
        ^ hash
}

pub struct SystemRng<'a> {
    inner: &'a mut ChaCha8Rng,
}

impl<'a> RngCore for SystemRng<'a> {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
