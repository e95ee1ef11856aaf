//! Randomness sources
//!
//! Two generators share one capability trait:
//! - `SeededGenerator` - reproducible, keyed by a string seed (shares, round choice)
//! - `EntropyGenerator` - unpredictable, OS-seeded (trade sizes, delays, shuffling)
//!
//! Code that needs reproducibility takes a `SeededGenerator` by type, never a
//! `dyn RandomSource`, so the two paths cannot be swapped by accident.

pub mod entropy;
pub mod seeded;

use std::ops::{Range, RangeInclusive};

pub use entropy::EntropyGenerator;
pub use seeded::SeededGenerator;

/// Common draw operations offered by every generator
pub trait RandomSource {
    /// Uniform float in `[range.start, range.end)`
    fn random_float(&mut self, range: Range<f64>) -> f64;

    /// Uniform integer in `[start, end]`, inclusive on both ends
    fn random_integer(&mut self, range: RangeInclusive<i64>) -> i64;

    /// True with probability `true_bias_pct` percent
    fn random_boolean(&mut self, true_bias_pct: u32) -> bool {
        self.random_integer(0..=99) < i64::from(true_bias_pct)
    }
}
