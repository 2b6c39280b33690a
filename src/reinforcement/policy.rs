// Epsilon-greedy action selection with a decaying exploration rate

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::reinforcement::{
    action::{ActionId, ActionSpace},
    approximator::{argmax, ValueApproximator},
    random::RandomSource,
    state::StateVector,
};

/// Outcome of one action selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub action: ActionId,
    /// True when the action was drawn at random
    pub explored: bool,
}

/// Interface for a policy over the transformation action space
pub trait Policy {
    /// Probability of choosing `action` from `state`
    fn action_probability(
        &self,
        state: &StateVector,
        action: ActionId,
        space: &ActionSpace,
        approximator: &dyn ValueApproximator,
    ) -> EngineResult<f64>;

    /// Choose an action from `state`
    fn select_action(
        &self,
        state: &StateVector,
        space: &ActionSpace,
        approximator: &dyn ValueApproximator,
        rng: &mut dyn RandomSource,
    ) -> EngineResult<Selection>;
}

/// Epsilon-greedy policy. Epsilon starts at `epsilon_max` and only ever
/// decays toward `epsilon_min`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    epsilon: f64,
    epsilon_min: f64,
    epsilon_max: f64,
    decay_factor: f64,
}

impl EpsilonGreedy {
    /// Create a policy; requires `0 <= min <= start <= 1` and `0 < decay < 1`
    pub fn new(epsilon_start: f64, epsilon_min: f64, decay_factor: f64) -> EngineResult<Self> {
        if !(0.0..=1.0).contains(&epsilon_start)
            || !(0.0..=1.0).contains(&epsilon_min)
            || epsilon_min > epsilon_start
        {
            return Err(EngineError::config(format!(
                "epsilon bounds must satisfy 0 <= min ({}) <= start ({}) <= 1",
                epsilon_min, epsilon_start
            )));
        }
        if !(decay_factor > 0.0 && decay_factor < 1.0) {
            return Err(EngineError::config(format!(
                "epsilon decay must lie in (0, 1), got {}",
                decay_factor
            )));
        }

        Ok(Self {
            epsilon: epsilon_start,
            epsilon_min,
            epsilon_max: epsilon_start,
            decay_factor,
        })
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn epsilon_min(&self) -> f64 {
        self.epsilon_min
    }

    pub fn epsilon_max(&self) -> f64 {
        self.epsilon_max
    }

    /// Apply one decay step after a completed training step
    pub fn decay(&mut self) -> f64 {
        self.epsilon = (self.epsilon * self.decay_factor).max(self.epsilon_min);
        self.epsilon
    }

    /// Restore a saved rate, clamped into the configured bounds
    pub fn restore_epsilon(&mut self, epsilon: f64) {
        if epsilon.is_nan() {
            return;
        }
        self.epsilon = epsilon.clamp(self.epsilon_min, self.epsilon_max);
    }
}

impl Policy for EpsilonGreedy {
    fn action_probability(
        &self,
        state: &StateVector,
        action: ActionId,
        space: &ActionSpace,
        approximator: &dyn ValueApproximator,
    ) -> EngineResult<f64> {
        if !space.contains(action) {
            return Ok(0.0);
        }

        let uniform = self.epsilon / space.len() as f64;
        let best = argmax(&approximator.predict(state)?);

        if best == Some(action) {
            Ok(1.0 - self.epsilon + uniform)
        } else {
            Ok(uniform)
        }
    }

    fn select_action(
        &self,
        state: &StateVector,
        space: &ActionSpace,
        approximator: &dyn ValueApproximator,
        rng: &mut dyn RandomSource,
    ) -> EngineResult<Selection> {
        // Exploration: with probability epsilon, choose a random action
        if rng.next_unit() <= self.epsilon {
            return Ok(Selection {
                action: ActionId(rng.next_index(space.len())),
                explored: true,
            });
        }

        let values = approximator.predict(state)?;
        let action = argmax(&values).unwrap_or(ActionId(0));

        Ok(Selection {
            action,
            explored: false,
        })
    }
}
