// Observability hooks for optimization episodes

use tracing::{debug, info};

use crate::reinforcement::{action::ActionId, engine::TrainingOutcome};

/// Receives lifecycle events from the optimization loop.
/// Every hook defaults to doing nothing.
pub trait EpisodeObserver: Send {
    fn episode_started(&mut self, _episode: u64, _artifact_len: usize) {}

    fn action_chosen(&mut self, _iteration: usize, _action: ActionId, _name: &str, _explored: bool) {}

    fn reward_observed(&mut self, _iteration: usize, _action: ActionId, _reward: f64, _changed: bool) {}

    fn training_finished(&mut self, _outcome: &TrainingOutcome) {}

    fn episode_finished(&mut self, _episode: u64, _applied: &[ActionId], _total_reward: f64) {}
}

/// Emits each event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EpisodeObserver for TracingObserver {
    fn episode_started(&mut self, episode: u64, artifact_len: usize) {
        info!(episode, artifact_len, "Optimization episode started");
    }

    fn action_chosen(&mut self, iteration: usize, action: ActionId, name: &str, explored: bool) {
        let mode = if explored { "exploration" } else { "exploitation" };
        debug!(
            iteration,
            action = action.index(),
            action_name = name,
            mode,
            "Action chosen"
        );
    }

    fn reward_observed(&mut self, iteration: usize, action: ActionId, reward: f64, changed: bool) {
        debug!(iteration, action = action.index(), reward, changed, "Reward observed");
    }

    fn training_finished(&mut self, outcome: &TrainingOutcome) {
        match outcome {
            TrainingOutcome::Skipped { stored, required } => {
                debug!(stored, required, "Not enough experiences for replay")
            }
            TrainingOutcome::Trained {
                batch,
                mean_loss,
                epsilon,
            } => info!(batch, mean_loss, epsilon, "Experience replay completed"),
        }
    }

    fn episode_finished(&mut self, episode: u64, applied: &[ActionId], total_reward: f64) {
        info!(
            episode,
            applied = applied.len(),
            total_reward,
            "Optimization episode finished"
        );
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentObserver;

impl EpisodeObserver for SilentObserver {}
