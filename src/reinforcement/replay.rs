// Experience replay for the transformation policy
// Bounded FIFO store of past transitions, sampled uniformly for training

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::error::{EngineError, EngineResult};
use crate::reinforcement::{action::ActionId, random::RandomSource, state::StateVector};

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub state: StateVector,
    pub action: ActionId,
    pub reward: f64,
    pub next_state: StateVector,
    pub terminal: bool,
}

impl Experience {
    pub fn new(
        state: StateVector,
        action: ActionId,
        reward: f64,
        next_state: StateVector,
        terminal: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            terminal,
        }
    }
}

/// Append-only experience store with FIFO eviction at capacity
#[derive(Debug, Clone, Default)]
pub struct ReplayMemory {
    experiences: VecDeque<Experience>,
    /// `None` means unbounded
    capacity: Option<usize>,
}

impl ReplayMemory {
    /// Create a memory; `Some(0)` is rejected
    pub fn new(capacity: Option<usize>) -> EngineResult<Self> {
        if capacity == Some(0) {
            return Err(EngineError::config("replay capacity must be at least 1"));
        }
        Ok(Self {
            experiences: VecDeque::with_capacity(capacity.unwrap_or(0).min(4096)),
            capacity,
        })
    }

    /// Memory that never evicts
    pub fn unbounded() -> Self {
        Self {
            experiences: VecDeque::new(),
            capacity: None,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an experience, evicting the oldest one when full
    pub fn store(&mut self, experience: Experience) {
        if let Some(capacity) = self.capacity {
            while self.experiences.len() >= capacity {
                self.experiences.pop_front();
            }
        }
        self.experiences.push_back(experience);
    }

    /// Uniform sample with replacement
    pub fn sample(
        &self,
        batch_size: usize,
        rng: &mut dyn RandomSource,
    ) -> EngineResult<Vec<&Experience>> {
        let available = self.experiences.len();
        if batch_size > available {
            return Err(EngineError::insufficient_data(batch_size, available));
        }

        Ok((0..batch_size)
            .map(|_| &self.experiences[rng.next_index(available)])
            .collect())
    }

    /// Number of stored experiences
    pub fn count(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.experiences.iter()
    }

    pub fn clear(&mut self) {
        self.experiences.clear();
    }
}
