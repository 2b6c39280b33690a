use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{map_io_err, EngineError, EngineResult};
use crate::reinforcement::{action::ActionSpace, state::EncoderKind};
use crate::transform::{rewrites::PYTHON, BuiltinRewrite};

/// Construction-time configuration of an optimization engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Action space contents, in order
    pub actions: Vec<String>,
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    pub epsilon_decay: f64,
    /// Discount factor for future rewards
    pub gamma: f64,
    /// Maximum stored experiences; `None` keeps everything
    pub replay_capacity: Option<usize>,
    pub batch_size: usize,
    /// Action selections per episode
    pub horizon: usize,
    /// Reward granted for every successful rewrite
    pub success_reward: f64,
    pub learning_rate: f64,
    pub hidden_units: usize,
    pub encoder: EncoderKind,
    /// Source language of the artifacts; built-in rewrites only run on Python
    pub language: String,
    /// Seed for exploration, replay sampling and weight initialisation
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            actions: BuiltinRewrite::DEFAULT_ACTIONS
                .iter()
                .map(|rewrite| rewrite.name().to_string())
                .collect(),
            epsilon_start: 1.0,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
            gamma: 0.95,
            replay_capacity: None,
            batch_size: 32,
            horizon: 5,
            success_reward: 10.0,
            learning_rate: 0.001,
            hidden_units: 64,
            encoder: EncoderKind::Length,
            language: PYTHON.to_string(),
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let content = std::fs::read_to_string(path).map_err(map_io_err(path))?;

        let config: Self = match ext {
            "json" => serde_json::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => {
                return Err(EngineError::config(format!(
                    "Unsupported config format: {}",
                    ext
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> EngineResult<()> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let content = match ext {
            "json" => serde_json::to_string_pretty(self)?,
            "yaml" | "yml" => serde_yaml::to_string(self)?,
            "toml" => toml::to_string(self)?,
            _ => {
                return Err(EngineError::config(format!(
                    "Unsupported config format: {}",
                    ext
                )))
            }
        };

        std::fs::write(path, content).map_err(map_io_err(path))?;
        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("refineml")
            .join("config.json")
    }

    /// Check the action list and every learning parameter
    pub fn validate(&self) -> EngineResult<()> {
        ActionSpace::new(self.actions.iter().cloned())?;
        if let Some(unknown) = self
            .actions
            .iter()
            .find(|name| BuiltinRewrite::from_name(name).is_none())
        {
            return Err(EngineError::config(format!("unknown action '{}'", unknown)));
        }
        self.validate_parameters()
    }

    /// Check the learning parameters only, for engines with a custom registry
    pub fn validate_parameters(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.epsilon_start)
            || !(0.0..=1.0).contains(&self.epsilon_min)
            || self.epsilon_min > self.epsilon_start
        {
            return Err(EngineError::config(format!(
                "epsilon bounds must satisfy 0 <= epsilon_min ({}) <= epsilon_start ({}) <= 1",
                self.epsilon_min, self.epsilon_start
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay < 1.0) {
            return Err(EngineError::config(format!(
                "epsilon_decay must lie in (0, 1), got {}",
                self.epsilon_decay
            )));
        }
        if !(0.0..1.0).contains(&self.gamma) {
            return Err(EngineError::config(format!(
                "gamma must lie in [0, 1), got {}",
                self.gamma
            )));
        }
        if self.replay_capacity == Some(0) {
            return Err(EngineError::config("replay_capacity must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(EngineError::config("batch_size must be at least 1"));
        }
        if let Some(capacity) = self.replay_capacity {
            if capacity < self.batch_size {
                return Err(EngineError::config(format!(
                    "replay_capacity ({}) cannot hold a batch of {}",
                    capacity, self.batch_size
                )));
            }
        }
        if self.horizon == 0 {
            return Err(EngineError::config("horizon must be at least 1"));
        }
        if !(self.success_reward > 0.0) || !self.success_reward.is_finite() {
            return Err(EngineError::config(format!(
                "success_reward must be positive, got {}",
                self.success_reward
            )));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(EngineError::config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.hidden_units == 0 {
            return Err(EngineError::config("hidden_units must be at least 1"));
        }
        if self.language.trim().is_empty() {
            return Err(EngineError::config("language must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = EngineConfig::default();
        assert_eq!(config.actions.len(), 9);
        assert_eq!(config.actions[0], "replace_nested_loops");
        assert_eq!(config.epsilon_start, 1.0);
        assert_eq!(config.epsilon_min, 0.01);
        assert_eq!(config.epsilon_decay, 0.995);
        assert_eq!(config.gamma, 0.95);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.horizon, 5);
        assert_eq!(config.replay_capacity, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases: [fn(&mut EngineConfig); 14] = [
            |c| c.actions.clear(),
            |c| c.actions.push("replace_nested_loops".into()),
            |c| c.actions.push("vectorize_everything".into()),
            |c| c.batch_size = 0,
            |c| c.horizon = 0,
            |c| c.replay_capacity = Some(0),
            |c| c.replay_capacity = Some(31),
            |c| c.epsilon_min = 2.0,
            |c| c.epsilon_decay = 1.0,
            |c| c.gamma = 1.0,
            |c| c.success_reward = 0.0,
            |c| c.learning_rate = -0.1,
            |c| c.hidden_units = 0,
            |c| c.language = "  ".into(),
        ];

        for (index, mutate) in cases.iter().enumerate() {
            let mut config = EngineConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(EngineError::Config { .. })),
                "case {} was accepted",
                index
            );
        }
    }

    #[test]
    fn test_round_trip_all_formats() {
        let dir = tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.replay_capacity = Some(500);
        config.seed = Some(7);
        config.encoder = EncoderKind::Features;

        for name in ["config.json", "config.yaml", "config.toml"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(EngineConfig::load(&path).unwrap(), config, "{}", name);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "horizon": 8, "actions": ["replace_manual_sum"] }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.horizon, 8);
        assert_eq!(config.actions, vec!["replace_manual_sum".to_string()]);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.language, "python");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.ini");
        assert!(matches!(
            EngineConfig::default().save(&path),
            Err(EngineError::Config { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = EngineConfig::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(EngineError::Io { .. })));
    }
}
