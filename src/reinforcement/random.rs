// Random sources for exploration and replay sampling
// Injected into the engine so tests can script exact choices

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of the uniform draws the policy and replay memory need
pub trait RandomSource: Send {
    /// Uniform draw in [0, 1)
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..upper`; `upper` of zero yields zero
    fn next_index(&mut self, upper: usize) -> usize;
}

/// Random source backed by the standard PRNG
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Reproducible source from a fixed seed
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from the operating system
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Seeded when a seed is given, OS entropy otherwise
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn next_index(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        self.rng.random_range(0..upper)
    }
}

/// Replays fixed sequences of draws, cycling when exhausted
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    units: VecDeque<f64>,
    indices: VecDeque<usize>,
}

impl ScriptedRandom {
    pub fn new(units: impl IntoIterator<Item = f64>, indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            units: units.into_iter().collect(),
            indices: indices.into_iter().collect(),
        }
    }

    /// Every unit draw returns `value`, every index draw returns zero
    pub fn constant(value: f64) -> Self {
        Self::new([value], [0])
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        match self.units.pop_front() {
            Some(value) => {
                self.units.push_back(value);
                value
            }
            None => 0.0,
        }
    }

    fn next_index(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        match self.indices.pop_front() {
            Some(index) => {
                self.indices.push_back(index);
                index % upper
            }
            None => 0,
        }
    }
}
