//! Splittable random seeds.
//!
//! A [`Seed`] is consumed by exactly one independent draw. Samplers that need
//! several independent draws split their seed first and hand a different
//! child to every draw.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

// Children are generated from a stream the draw generator never reads from.
const SPLIT_STREAM: u64 = 0x5eed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Seed(u64);

impl Seed {
    pub fn new(key: u64) -> Self {
        Self(key)
    }

    pub fn key(&self) -> u64 {
        self.0
    }

    /// Split into two independent children.
    pub fn split(self) -> (Seed, Seed) {
        let mut rng = self.split_rng();
        (Seed(rng.next_u64()), Seed(rng.next_u64()))
    }

    /// Split into `num` independent children.
    pub fn split_n(self, num: usize) -> Vec<Seed> {
        let mut rng = self.split_rng();
        (0..num).map(|_| Seed(rng.next_u64())).collect()
    }

    /// The generator a single draw consumes.
    pub fn rng(self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    fn split_rng(self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.0);
        rng.set_stream(SPLIT_STREAM);
        rng
    }
}

impl From<u64> for Seed {
    fn from(key: u64) -> Self {
        Seed::new(key)
    }
}
