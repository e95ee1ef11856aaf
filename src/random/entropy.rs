//! OS-seeded generator for per-run jitter
//!
//! Used where runs should not be predictable: trade sizes, sell fractions,
//! pauses between groups and the endpoint pool shuffle.

use rand::prelude::*;
use rand::rngs::StdRng;
use std::ops::{Range, RangeInclusive};
use std::time::Duration;

use super::RandomSource;

/// Unpredictable generator backed by `StdRng`
pub struct EntropyGenerator {
    rng: StdRng,
}

impl EntropyGenerator {
    /// Create a generator seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a generator with a fixed seed (tests only need this)
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Shuffle a slice in place (Fisher-Yates)
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Random delay within an inclusive millisecond range
    pub fn random_delay(&mut self, min_ms: u64, max_ms: u64) -> Duration {
        if max_ms <= min_ms {
            return Duration::from_millis(min_ms);
        }
        Duration::from_millis(self.rng.gen_range(min_ms..=max_ms))
    }
}

impl Default for EntropyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropyGenerator {
    fn random_float(&mut self, range: Range<f64>) -> f64 {
        if range.end <= range.start {
            return range.start;
        }
        self.rng.gen_range(range)
    }

    fn random_integer(&mut self, range: RangeInclusive<i64>) -> i64 {
        if range.end() < range.start() {
            return *range.start();
        }
        self.rng.gen_range(range)
    }
}
