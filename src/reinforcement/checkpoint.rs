// Engine checkpoints
// Persists the learned state of an engine (exploration rate, replay memory and
// approximator parameters) as pretty-printed JSON

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{map_io_err, EngineError, EngineResult};
use crate::reinforcement::{engine::OptimizationEngine, replay::Experience};

/// Serializable snapshot of an engine's learned state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCheckpoint {
    pub epsilon: f64,
    #[serde(default)]
    pub episodes: u64,
    pub experiences: Vec<Experience>,
    /// Approximator parameters, absent when the approximator cannot export them
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl EngineCheckpoint {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(map_io_err(path))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(map_io_err(parent))?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(map_io_err(path))
    }
}

impl OptimizationEngine {
    /// Capture the current learned state
    pub fn checkpoint(&self) -> EngineResult<EngineCheckpoint> {
        Ok(EngineCheckpoint {
            epsilon: self.epsilon(),
            episodes: self.episodes(),
            experiences: self.memory().iter().cloned().collect(),
            parameters: self.approximator().parameters()?,
        })
    }

    /// Replace the learned state with `checkpoint`.
    ///
    /// The engine's own replay capacity and epsilon bounds still apply, so
    /// older experiences may be evicted and epsilon clamped. Nothing is
    /// changed when the checkpoint does not fit this engine.
    pub fn restore(&mut self, checkpoint: EngineCheckpoint) -> EngineResult<()> {
        let dimension = self.encoder_dimension();
        for experience in &checkpoint.experiences {
            for state in [&experience.state, &experience.next_state] {
                if state.dimension() != dimension {
                    return Err(EngineError::shape(dimension, state.dimension()));
                }
            }
            if !self.action_space().contains(experience.action) {
                return Err(EngineError::config(format!(
                    "checkpoint references action {} outside a space of {}",
                    experience.action,
                    self.action_space().len()
                )));
            }
        }

        if let Some(parameters) = checkpoint.parameters {
            self.approximator_mut().load_parameters(parameters)?;
        }

        let memory = self.memory_mut();
        memory.clear();
        for experience in checkpoint.experiences {
            memory.store(experience);
        }
        self.policy_mut().restore_epsilon(checkpoint.epsilon);
        self.set_episodes(checkpoint.episodes);
        Ok(())
    }

    pub fn save_checkpoint(&self, path: &Path) -> EngineResult<()> {
        self.checkpoint()?.save(path)?;
        info!("Checkpoint saved to {}", path.display());
        Ok(())
    }

    pub fn restore_checkpoint(&mut self, path: &Path) -> EngineResult<()> {
        let checkpoint = EngineCheckpoint::load(path)?;
        self.restore(checkpoint)?;
        info!(
            "Checkpoint restored from {} ({} experiences, epsilon {:.4})",
            path.display(),
            self.memory().count(),
            self.epsilon()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::reinforcement::observer::SilentObserver;
    use crate::reinforcement::state::StateVector;
    use crate::reinforcement::ActionId;
    use tempfile::tempdir;

    const NESTED: &str = "result = []\nfor i in range(10):\n for j in range(10):\n  result.append(i*j)";

    fn engine(config: EngineConfig) -> OptimizationEngine {
        OptimizationEngine::builder(config)
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap()
    }

    fn trained_engine() -> OptimizationEngine {
        let mut engine = engine(EngineConfig {
            batch_size: 2,
            seed: Some(3),
            ..EngineConfig::default()
        });
        engine.optimize(NESTED).unwrap();
        engine.optimize(NESTED).unwrap();
        engine
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("engine.json");
        let source = trained_engine();
        source.save_checkpoint(&path).unwrap();

        let mut restored = engine(EngineConfig {
            seed: Some(99),
            ..EngineConfig::default()
        });
        restored.restore_checkpoint(&path).unwrap();

        assert!((restored.epsilon() - source.epsilon()).abs() < 1e-12);
        assert_eq!(restored.episodes(), 2);
        assert_eq!(restored.memory().count(), source.memory().count());

        let state = StateVector::new(vec![42.0]);
        let expected = source.approximator().predict(&state).unwrap();
        let actual = restored.approximator().predict(&state).unwrap();
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_restore_applies_capacity_and_clamps_epsilon() {
        let mut checkpoint = trained_engine().checkpoint().unwrap();
        checkpoint.epsilon = 7.0;
        let newest = checkpoint.experiences.last().cloned().unwrap();

        let mut small = engine(EngineConfig {
            replay_capacity: Some(2),
            batch_size: 2,
            ..EngineConfig::default()
        });
        small.restore(checkpoint).unwrap();

        assert_eq!(small.memory().count(), 2);
        assert_eq!(small.memory().iter().last(), Some(&newest));
        assert_eq!(small.epsilon(), 1.0);
    }

    #[test]
    fn test_restore_rejects_foreign_checkpoint() {
        let mut checkpoint = trained_engine().checkpoint().unwrap();
        checkpoint.parameters = None;
        checkpoint.experiences[0].action = ActionId(40);

        let mut target = engine(EngineConfig::default());
        let err = target.restore(checkpoint).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
        assert!(target.memory().is_empty());
    }

    #[test]
    fn test_restore_rejects_wrong_state_width() {
        let mut checkpoint = trained_engine().checkpoint().unwrap();
        checkpoint.parameters = None;
        checkpoint.experiences[0].state = StateVector::new(vec![1.0, 2.0]);

        let mut target = engine(EngineConfig::default());
        let err = target.restore(checkpoint).unwrap_err();
        assert!(matches!(err, EngineError::Shape { expected: 1, actual: 2 }));
    }

    #[test]
    fn test_restore_rejects_damaged_network() {
        let mut checkpoint = trained_engine().checkpoint().unwrap();
        if let Some(parameters) = checkpoint.parameters.as_mut() {
            parameters["layers"] = serde_json::json!([]);
        }

        let mut target = engine(EngineConfig::default());
        let err = target.restore(checkpoint).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
        assert!(target.memory().is_empty());

        // The engine keeps its own network and still runs
        assert!(target.optimize(NESTED).is_ok());
    }

    #[test]
    fn test_missing_checkpoint_is_io_error() {
        let dir = tempdir().unwrap();
        let mut target = engine(EngineConfig::default());
        let err = target
            .restore_checkpoint(&dir.path().join("absent.json"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
