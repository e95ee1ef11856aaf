//! Unique share generation
//!
//! Splits a total into `count` distinct values inside a deviation band around
//! the mean using bounded rejection sampling. Either a valid partition comes
//! back or `PartitionExhausted`; there is no best-effort fallback.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::error::{Error, Result};
use crate::random::RandomSource;

/// Hard cap on search attempts per request
pub const MAX_ATTEMPTS_LIMIT: u32 = 500_000;

/// Accepted distance between the rounded sum and the target
pub const SUM_TOLERANCE: f64 = 0.05;

/// Parameters for one share generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRequest {
    pub count: usize,
    pub total_sum: f64,
    /// Allowed deviation from the mean as a fraction (0.2 = +/-20%)
    pub deviation: f64,
    pub max_attempts: u32,
}

impl ShareRequest {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InvalidPartition("count must be at least 1".into()));
        }
        if !(self.total_sum > 0.0) || !self.total_sum.is_finite() {
            return Err(Error::InvalidPartition(format!(
                "total_sum must be positive, got {}",
                self.total_sum
            )));
        }
        if !(self.deviation > 0.0 && self.deviation < 1.0) {
            return Err(Error::InvalidPartition(format!(
                "deviation must be strictly between 0 and 1, got {}",
                self.deviation
            )));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(Error::InvalidPartition(format!(
                "max_attempts must be in 1..={}, got {}",
                MAX_ATTEMPTS_LIMIT, self.max_attempts
            )));
        }
        Ok(())
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Generate `count` distinct shares summing to `total_sum`
pub fn generate_unique_shares<R: RandomSource>(
    request: &ShareRequest,
    rng: &mut R,
) -> Result<Vec<f64>> {
    request.validate()?;

    let count = request.count;
    let mean = request.total_sum / count as f64;
    let min = mean * (1.0 - request.deviation);
    let max = mean * (1.0 + request.deviation);
    let range = max - min;
    let target_excess = request.total_sum - count as f64 * min;

    let mut draws = vec![0.0; count];

    for attempt in 1..=request.max_attempts {
        for slot in draws.iter_mut() {
            *slot = rng.random_float(0.0..1.0);
        }

        let draw_sum: f64 = draws.iter().sum();
        if draw_sum <= 0.0 {
            continue;
        }

        let excess: Vec<f64> = draws
            .iter()
            .map(|d| d / draw_sum * target_excess)
            .collect();
        if excess.iter().any(|e| *e > range) {
            continue;
        }

        let values: Vec<f64> = excess.iter().map(|e| round_cents(min + e)).collect();

        // Rounding can nudge a value just outside the band
        if values.iter().any(|v| *v < min - 1e-9 || *v > max + 1e-9) {
            continue;
        }

        let distinct: HashSet<i64> = values.iter().map(|v| (v * 100.0).round() as i64).collect();
        if distinct.len() != count {
            continue;
        }

        let sum: f64 = values.iter().sum();
        if (sum - request.total_sum).abs() >= SUM_TOLERANCE {
            continue;
        }

        debug!(
            "Generated {} unique shares after {} attempts (sum {:.2})",
            count, attempt, sum
        );
        return Ok(values);
    }

    Err(Error::PartitionExhausted {
        attempts: request.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{EntropyGenerator, SeededGenerator};

    fn request(count: usize, total_sum: f64, deviation: f64, max_attempts: u32) -> ShareRequest {
        ShareRequest {
            count,
            total_sum,
            deviation,
            max_attempts,
        }
    }

    fn assert_valid(values: &[f64], req: &ShareRequest) {
        let mean = req.total_sum / req.count as f64;
        let lo = mean * (1.0 - req.deviation);
        let hi = mean * (1.0 + req.deviation);

        assert_eq!(values.len(), req.count);
        let sum: f64 = values.iter().sum();
        assert!((sum - req.total_sum).abs() < SUM_TOLERANCE, "sum {}", sum);
        for v in values {
            assert!(*v >= lo - 1e-9 && *v <= hi + 1e-9, "{} outside [{}, {}]", v, lo, hi);
        }
        let distinct: HashSet<i64> = values.iter().map(|v| (v * 100.0).round() as i64).collect();
        assert_eq!(distinct.len(), values.len());
    }

    #[test]
    fn test_five_shares_of_one_hundred() {
        let req = request(5, 100.0, 0.2, 10_000);
        let mut rng = SeededGenerator::new("TEST");
        let values = generate_unique_shares(&req, &mut rng).unwrap();

        assert_valid(&values, &req);
        assert!(values.iter().all(|v| *v >= 16.0 && *v <= 24.0));
    }

    #[test]
    fn test_seeded_shares_are_reproducible() {
        let req = request(12, 1000.0, 0.3, 50_000);
        let a = generate_unique_shares(&req, &mut SeededGenerator::new("MEME")).unwrap();
        let b = generate_unique_shares(&req, &mut SeededGenerator::new("MEME")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unseeded_shares_are_valid() {
        let req = request(20, 100.0, 0.5, 100_000);
        let mut rng = EntropyGenerator::new();
        let values = generate_unique_shares(&req, &mut rng).unwrap();
        assert_valid(&values, &req);
    }

    #[test]
    fn test_single_share_takes_everything() {
        let req = request(1, 42.5, 0.1, 10);
        let values = generate_unique_shares(&req, &mut SeededGenerator::new("one")).unwrap();
        assert_eq!(values, vec![42.5]);
    }

    #[test]
    fn test_zero_deviation_rejected() {
        let req = request(5, 100.0, 0.0, 1000);
        let result = generate_unique_shares(&req, &mut SeededGenerator::new("x"));
        assert!(matches!(result, Err(Error::InvalidPartition(_))));
    }

    #[test]
    fn test_attempt_cap_enforced() {
        let req = request(5, 100.0, 0.2, MAX_ATTEMPTS_LIMIT + 1);
        let result = generate_unique_shares(&req, &mut SeededGenerator::new("x"));
        assert!(matches!(result, Err(Error::InvalidPartition(_))));
    }

    #[test]
    fn test_impossible_uniqueness_exhausts() {
        // 50 distinct cent values cannot fit in a band only 0.02 wide
        let req = request(50, 50.0, 0.01, 200);
        let result = generate_unique_shares(&req, &mut SeededGenerator::new("tight"));
        match result {
            Err(Error::PartitionExhausted { attempts }) => assert_eq!(attempts, 200),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }
}
