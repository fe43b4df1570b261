//! Randomness Source
//!
//! All stochastic behavior in the core (growth factors, event draws,
//! progress increments) goes through the [`Randomness`] trait so tests
//! can pin outcomes deterministically instead of sampling the OS RNG.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Injectable source of randomness for the drivers.
pub trait Randomness: Send + Sync {
    /// Uniform draw from `[lo, hi)`.
    fn range(&self, lo: f64, hi: f64) -> f64;

    /// Bernoulli trial with probability `p` (clamped to `[0, 1]`).
    fn chance(&self, p: f64) -> bool;

    /// Uniform index draw from `0..n`. `n` must be non-zero.
    fn pick(&self, n: usize) -> usize;
}

/// Production source backed by the thread-local OS-seeded RNG.
#[derive(Default)]
pub struct OsRandomness;

impl Randomness for OsRandomness {
    fn range(&self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        rand::thread_rng().gen_range(lo..hi)
    }

    fn chance(&self, p: f64) -> bool {
        rand::thread_rng().gen_bool(p.clamp(0.0, 1.0))
    }

    fn pick(&self, n: usize) -> usize {
        rand::thread_rng().gen_range(0..n)
    }
}

/// Deterministic source seeded from a fixed value. Draws are
/// reproducible across runs for a given seed.
pub struct SeededRandomness {
    rng: Mutex<StdRng>,
}

impl SeededRandomness {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Randomness for SeededRandomness {
    fn range(&self, lo: f64, hi: f64) -> f64 {
        if hi <= lo {
            return lo;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(lo..hi)
    }

    fn chance(&self, p: f64) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_bool(p.clamp(0.0, 1.0))
    }

    fn pick(&self, n: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..n)
    }
}

/// Fully pinned source for tests. `range` interpolates between the
/// bounds by `factor`, so `factor = 1.0` yields the top of the range
/// and `factor = 0.5` the midpoint.
pub struct PinnedRandomness {
    pub factor: f64,
    pub chance_outcome: bool,
    pub pick_index: usize,
}

impl PinnedRandomness {
    pub fn new(factor: f64, chance_outcome: bool, pick_index: usize) -> Self {
        Self {
            factor,
            chance_outcome,
            pick_index,
        }
    }
}

impl Randomness for PinnedRandomness {
    fn range(&self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.factor
    }

    fn chance(&self, _p: f64) -> bool {
        self.chance_outcome
    }

    fn pick(&self, n: usize) -> usize {
        self.pick_index % n.max(1)
    }
}
