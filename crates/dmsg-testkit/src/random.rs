//! Deterministic random sources

use dmsg_core::RandomEffects;
use parking_lot::Mutex;
use rand::RngCore;
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};

/// Seeded ChaCha20 stream; the same seed always yields the same values.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededRandom {
    /// Create from a 32-byte seed
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }

    /// Create with the fixed default seed
    pub fn deterministic() -> Self {
        Self::with_seed([42; 32])
    }
}

impl RandomEffects for SeededRandom {
    fn random_u32(&self) -> u32 {
        self.rng.lock().next_u32()
    }
}

/// Replays a fixed list of values, wrapping around at the end.
#[derive(Debug)]
pub struct SequenceRandom {
    values: Vec<u32>,
    next: Mutex<usize>,
}

impl SequenceRandom {
    /// Replay `values` in order. An empty list always yields zero.
    pub fn new(values: Vec<u32>) -> Self {
        Self {
            values,
            next: Mutex::new(0),
        }
    }

    /// Always yield `value`
    pub fn constant(value: u32) -> Self {
        Self::new(vec![value])
    }
}

impl RandomEffects for SequenceRandom {
    fn random_u32(&self) -> u32 {
        if self.values.is_empty() {
            return 0;
        }
        let mut next = self.next.lock();
        let value = self.values[*next % self.values.len()];
        *next += 1;
        value
    }
}
