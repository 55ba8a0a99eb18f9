//! Seeded randomness for reproducible fault runs.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Shared random source. A seed makes every draw sequence repeatable.
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// `None` seeds from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Bernoulli draw. Rates at or outside the bounds consume no randomness.
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            false
        } else if rate >= 1.0 {
            true
        } else {
            self.inner.lock().gen_bool(rate)
        }
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockRng")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let a = MockRng::new(Some(42));
        let b = MockRng::new(Some(42));
        let draws = |rng: &MockRng| (0..64).map(|_| rng.should_fail(0.5)).collect::<Vec<_>>();
        assert_eq!(draws(&a), draws(&b));
    }

    #[test]
    fn test_bounds() {
        let rng = MockRng::new(Some(7));
        assert!((0..100).all(|_| !rng.should_fail(0.0)));
        assert!((0..100).all(|_| rng.should_fail(1.0)));
    }

    #[test]
    fn test_rate_is_roughly_honored() {
        let rng = MockRng::new(Some(42));
        let failures = (0..10_000).filter(|_| rng.should_fail(0.05)).count();
        assert!(failures > 350 && failures < 650, "got {} failures", failures);
    }
}
