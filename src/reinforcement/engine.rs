// Optimization loop for the transformation policy
// Encodes the artifact, selects and applies actions, records experiences and
// trains the value approximator once per episode

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::reinforcement::{
    action::{ActionId, ActionSpace},
    approximator::{max_value, MlpApproximator, ValueApproximator},
    observer::{EpisodeObserver, TracingObserver},
    policy::{EpsilonGreedy, Policy},
    random::{RandomSource, SeededRandom},
    replay::{Experience, ReplayMemory},
    state::{CodeArtifact, StateEncoder, StateVector},
};
use crate::transform::TransformationRegistry;

/// States of the optimization loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Encoding,
    SelectingAction,
    Applying,
    Observing,
    Training,
}

/// Result of the training step that closes an episode
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainingOutcome {
    /// Fewer experiences stored than the batch size; nothing was updated
    Skipped { stored: usize, required: usize },
    /// A batch was replayed and epsilon decayed
    Trained {
        batch: usize,
        mean_loss: f64,
        epsilon: f64,
    },
}

impl TrainingOutcome {
    pub fn trained(&self) -> bool {
        matches!(self, TrainingOutcome::Trained { .. })
    }
}

/// Everything one episode produced
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    /// Actions that changed the artifact, in the order they fired
    pub applied: Vec<ActionId>,
    /// Names of the applied actions, same order
    pub suggestions: Vec<String>,
    /// The final artifact
    pub artifact: CodeArtifact,
    pub total_reward: f64,
    pub training: TrainingOutcome,
}

impl OptimizationOutcome {
    /// The `(suggestions, final artifact)` pair
    pub fn into_parts(self) -> (Vec<String>, CodeArtifact) {
        (self.suggestions, self.artifact)
    }
}

/// Adaptive transformation-policy engine.
///
/// Each instance exclusively owns its value approximator, replay memory,
/// exploration rate and random source.
pub struct OptimizationEngine {
    config: EngineConfig,
    space: ActionSpace,
    registry: TransformationRegistry,
    encoder: Box<dyn StateEncoder>,
    approximator: Box<dyn ValueApproximator>,
    memory: ReplayMemory,
    policy: EpsilonGreedy,
    rng: Box<dyn RandomSource>,
    observer: Box<dyn EpisodeObserver>,
    phase: LoopPhase,
    episodes: u64,
}

impl OptimizationEngine {
    /// Build an engine with the built-in registry and default collaborators
    pub fn from_config(config: EngineConfig) -> EngineResult<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Run one episode over `artifact`.
    ///
    /// Only shape and configuration errors escape; a transformation that
    /// fails or does not apply simply yields reward zero.
    pub fn optimize(&mut self, artifact: impl Into<CodeArtifact>) -> EngineResult<OptimizationOutcome> {
        let result = self.run_episode(artifact.into());
        self.phase = LoopPhase::Idle;
        result
    }

    fn run_episode(&mut self, artifact: CodeArtifact) -> EngineResult<OptimizationOutcome> {
        self.episodes += 1;
        let episode = self.episodes;
        self.observer.episode_started(episode, artifact.char_len());

        self.phase = LoopPhase::Encoding;
        let mut state = self.encode(&artifact)?;
        let mut current = artifact;
        let mut applied = Vec::new();
        let mut total_reward = 0.0;

        for iteration in 0..self.config.horizon {
            self.phase = LoopPhase::SelectingAction;
            let selection = self.policy.select_action(
                &state,
                &self.space,
                self.approximator.as_ref(),
                self.rng.as_mut(),
            )?;
            let action = selection.action;
            let name = self.space.name(action).unwrap_or("<unregistered>");
            self.observer
                .action_chosen(iteration, action, name, selection.explored);

            self.phase = LoopPhase::Applying;
            let (next, reward) = self.registry.apply(action, &current);
            let changed = next != current;
            if changed {
                applied.push(action);
            }
            self.observer.reward_observed(iteration, action, reward, changed);

            self.phase = LoopPhase::Observing;
            let next_state = self.encode(&next)?;
            self.memory.store(Experience::new(
                state,
                action,
                reward,
                next_state.clone(),
                reward > 0.0,
            ));
            total_reward += reward;
            current = next;
            state = next_state;
        }

        self.phase = LoopPhase::Training;
        let training = self.train()?;
        self.observer.training_finished(&training);

        let suggestions = applied
            .iter()
            .filter_map(|action| self.space.name(*action).map(str::to_string))
            .collect();
        self.observer
            .episode_finished(episode, &applied, total_reward);

        Ok(OptimizationOutcome {
            applied,
            suggestions,
            artifact: current,
            total_reward,
            training,
        })
    }

    fn encode(&self, artifact: &CodeArtifact) -> EngineResult<StateVector> {
        let state = self.encoder.encode(artifact)?;
        if state.dimension() != self.approximator.input_dim() {
            return Err(EngineError::shape(
                self.approximator.input_dim(),
                state.dimension(),
            ));
        }
        Ok(state)
    }

    /// Replay a batch and decay epsilon. With fewer stored experiences than
    /// the batch size this is a no-op.
    pub fn train(&mut self) -> EngineResult<TrainingOutcome> {
        let required = self.config.batch_size;
        let batch = match self.memory.sample(required, self.rng.as_mut()) {
            Ok(batch) => batch,
            Err(EngineError::InsufficientData { available, .. }) => {
                return Ok(TrainingOutcome::Skipped {
                    stored: available,
                    required,
                });
            }
            Err(e) => return Err(e),
        };

        let mut total_loss = 0.0;
        for experience in &batch {
            let target = if experience.terminal {
                experience.reward
            } else {
                let next_values = self.approximator.predict(&experience.next_state)?;
                experience.reward + self.config.gamma * max_value(&next_values)
            };
            total_loss += self
                .approximator
                .fit(&experience.state, experience.action, target)?;
        }

        let epsilon = self.policy.decay();
        Ok(TrainingOutcome::Trained {
            batch: batch.len(),
            mean_loss: total_loss / batch.len() as f64,
            epsilon,
        })
    }

    /// Names of the actions whose precondition matches `artifact`
    pub fn applicable_actions(&self, artifact: &CodeArtifact) -> Vec<String> {
        self.registry
            .applicable_actions(artifact)
            .into_iter()
            .filter_map(|action| self.space.name(action).map(str::to_string))
            .collect()
    }

    /// Current exploration rate
    pub fn epsilon(&self) -> f64 {
        self.policy.epsilon()
    }

    pub fn policy(&self) -> &EpsilonGreedy {
        &self.policy
    }

    pub fn memory(&self) -> &ReplayMemory {
        &self.memory
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.space
    }

    pub fn approximator(&self) -> &dyn ValueApproximator {
        self.approximator.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Number of episodes started so far
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    pub(crate) fn encoder_dimension(&self) -> usize {
        self.encoder.dimension()
    }

    pub(crate) fn policy_mut(&mut self) -> &mut EpsilonGreedy {
        &mut self.policy
    }

    pub(crate) fn memory_mut(&mut self) -> &mut ReplayMemory {
        &mut self.memory
    }

    pub(crate) fn approximator_mut(&mut self) -> &mut dyn ValueApproximator {
        self.approximator.as_mut()
    }

    pub(crate) fn set_episodes(&mut self, episodes: u64) {
        self.episodes = episodes;
    }
}

impl std::fmt::Debug for OptimizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationEngine")
            .field("actions", &self.space.names())
            .field("epsilon", &self.policy.epsilon())
            .field("stored_experiences", &self.memory.count())
            .field("phase", &self.phase)
            .field("episodes", &self.episodes)
            .finish()
    }
}

/// Assembles an [`OptimizationEngine`], filling anything not injected from
/// the configuration
pub struct EngineBuilder {
    config: EngineConfig,
    registry: Option<TransformationRegistry>,
    encoder: Option<Box<dyn StateEncoder>>,
    approximator: Option<Box<dyn ValueApproximator>>,
    rng: Option<Box<dyn RandomSource>>,
    observer: Option<Box<dyn EpisodeObserver>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: None,
            encoder: None,
            approximator: None,
            rng: None,
            observer: None,
        }
    }

    /// Use a custom registry instead of `config.actions`
    pub fn with_registry(mut self, registry: TransformationRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_encoder(mut self, encoder: Box<dyn StateEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn with_approximator(mut self, approximator: Box<dyn ValueApproximator>) -> Self {
        self.approximator = Some(approximator);
        self
    }

    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn EpisodeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> EngineResult<OptimizationEngine> {
        let config = self.config;

        let registry = match self.registry {
            Some(registry) => {
                config.validate_parameters()?;
                registry
            }
            None => {
                config.validate()?;
                TransformationRegistry::builtin(config.actions.as_slice(), config.success_reward)?
                    .with_language(config.language.as_str())
            }
        };
        let space = registry.action_space()?;

        let encoder = self.encoder.unwrap_or_else(|| config.encoder.build());
        let approximator = match self.approximator {
            Some(approximator) => approximator,
            None => Box::new(MlpApproximator::new(
                encoder.dimension(),
                space.len(),
                config.hidden_units,
                config.learning_rate,
                config.seed.map(|seed| seed.wrapping_add(1)),
            )?),
        };

        if approximator.input_dim() != encoder.dimension() {
            return Err(EngineError::config(format!(
                "approximator expects {} features, encoder produces {}",
                approximator.input_dim(),
                encoder.dimension()
            )));
        }
        if approximator.action_count() != space.len() {
            return Err(EngineError::config(format!(
                "approximator scores {} actions, action space has {}",
                approximator.action_count(),
                space.len()
            )));
        }

        let memory = ReplayMemory::new(config.replay_capacity)?;
        let policy = EpsilonGreedy::new(
            config.epsilon_start,
            config.epsilon_min,
            config.epsilon_decay,
        )?;
        let rng = self
            .rng
            .unwrap_or_else(|| Box::new(SeededRandom::from_optional_seed(config.seed)));
        let observer = self
            .observer
            .unwrap_or_else(|| Box::new(TracingObserver));

        debug!(
            "Engine initialized with {} actions: {:?}",
            space.len(),
            space.names()
        );

        Ok(OptimizationEngine {
            config,
            space,
            registry,
            encoder,
            approximator,
            memory,
            policy,
            rng,
            observer,
            phase: LoopPhase::Idle,
            episodes: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reinforcement::observer::SilentObserver;
    use crate::reinforcement::random::ScriptedRandom;
    use crate::reinforcement::state::LengthEncoder;
    use crate::transform::Transformation;
    use std::sync::{Arc, Mutex};

    const NESTED: &str = "result = []\nfor i in range(10):\n for j in range(10):\n  result.append(i*j)";

    fn config() -> EngineConfig {
        EngineConfig {
            seed: Some(7),
            ..EngineConfig::default()
        }
    }

    fn scripted_engine(config: EngineConfig, rng: ScriptedRandom) -> OptimizationEngine {
        OptimizationEngine::builder(config)
            .with_random_source(Box::new(rng))
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap()
    }

    /// Encoder that claims one feature but produces two
    struct LyingEncoder;

    impl StateEncoder for LyingEncoder {
        fn dimension(&self) -> usize {
            1
        }

        fn encode(&self, _artifact: &CodeArtifact) -> EngineResult<StateVector> {
            Ok(StateVector::new(vec![1.0, 2.0]))
        }
    }

    type FitLog = Arc<Mutex<Vec<(StateVector, ActionId, f64)>>>;

    /// Predicts fixed values and records every fit target
    struct RecordingApproximator {
        values: Vec<f64>,
        fits: FitLog,
    }

    impl ValueApproximator for RecordingApproximator {
        fn input_dim(&self) -> usize {
            1
        }

        fn action_count(&self) -> usize {
            self.values.len()
        }

        fn predict(&self, _state: &StateVector) -> EngineResult<Vec<f64>> {
            Ok(self.values.clone())
        }

        fn fit(&mut self, state: &StateVector, action: ActionId, target: f64) -> EngineResult<f64> {
            self.fits.lock().unwrap().push((state.clone(), action, target));
            Ok(0.0)
        }
    }

    struct Exploding;

    impl Transformation for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn rewrite(&self, _code: &str) -> EngineResult<Option<String>> {
            Err(EngineError::registry("exploding", "boom"))
        }
    }

    #[test]
    fn test_nested_loop_scenario() {
        // Always explore and always pick action 0 (replace_nested_loops)
        let mut engine = scripted_engine(config(), ScriptedRandom::new([0.0], [0]));

        let outcome = engine.optimize(NESTED).unwrap();

        assert_eq!(outcome.suggestions, vec!["replace_nested_loops".to_string()]);
        assert_eq!(outcome.applied, vec![ActionId(0)]);
        assert_eq!(
            outcome.artifact.as_str(),
            "result = [i*j for i in range(10) for j in range(10)]"
        );
        assert_eq!(outcome.total_reward, 10.0);

        assert_eq!(engine.memory().count(), 5);
        let first = engine.memory().iter().next().unwrap();
        assert_eq!(first.reward, 10.0);
        assert!(first.terminal);
        assert!(engine
            .memory()
            .iter()
            .skip(1)
            .all(|e| e.reward == 0.0 && !e.terminal));

        // Five experiences are not enough for a batch of 32
        assert_eq!(
            outcome.training,
            TrainingOutcome::Skipped {
                stored: 5,
                required: 32
            }
        );
        assert_eq!(engine.epsilon(), 1.0);
        assert_eq!(engine.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_other_languages_are_left_alone() {
        let config = EngineConfig {
            language: "javascript".to_string(),
            ..config()
        };
        let mut engine = scripted_engine(config, ScriptedRandom::new([0.0], [0]));

        let outcome = engine.optimize(NESTED).unwrap();

        assert!(outcome.suggestions.is_empty());
        assert_eq!(outcome.artifact.as_str(), NESTED);
        assert!(engine.applicable_actions(&CodeArtifact::from(NESTED)).is_empty());
    }

    #[test]
    fn test_into_parts() {
        let mut engine = scripted_engine(config(), ScriptedRandom::new([0.0], [0]));
        let (suggestions, artifact) = engine.optimize(NESTED).unwrap().into_parts();
        assert_eq!(suggestions, vec!["replace_nested_loops".to_string()]);
        assert!(artifact.as_str().starts_with("result = [i*j"));
    }

    #[test]
    fn test_empty_artifact() {
        let mut engine = scripted_engine(config(), ScriptedRandom::new([0.0], 0..9));

        let outcome = engine.optimize("").unwrap();

        assert!(outcome.suggestions.is_empty());
        assert!(outcome.artifact.is_empty());
        assert_eq!(outcome.total_reward, 0.0);
        assert_eq!(engine.memory().count(), 5);
    }

    #[test]
    fn test_no_op_never_changes_artifact() {
        let registry = TransformationRegistry::builtin(&["no_op"], 10.0).unwrap();
        let mut engine = OptimizationEngine::builder(config())
            .with_registry(registry)
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap();

        let outcome = engine.optimize(NESTED).unwrap();

        assert!(outcome.suggestions.is_empty());
        assert_eq!(outcome.artifact.as_str(), NESTED);
        assert!(engine.memory().iter().all(|e| e.reward == 0.0 && !e.terminal));
    }

    #[test]
    fn test_failing_transformation_is_absorbed() {
        let mut registry = TransformationRegistry::new();
        registry.register(Box::new(Exploding), 5.0).unwrap();
        let mut engine = OptimizationEngine::builder(config())
            .with_registry(registry)
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap();

        let outcome = engine.optimize(NESTED).unwrap();

        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.total_reward, 0.0);
        assert_eq!(engine.phase(), LoopPhase::Idle);
    }

    #[test]
    fn test_training_runs_and_decays_epsilon() {
        let config = EngineConfig {
            batch_size: 4,
            ..config()
        };
        let mut engine = OptimizationEngine::builder(config)
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap();

        let outcome = engine.optimize(NESTED).unwrap();

        match outcome.training {
            TrainingOutcome::Trained {
                batch,
                mean_loss,
                epsilon,
            } => {
                assert_eq!(batch, 4);
                assert!(mean_loss.is_finite());
                assert!((epsilon - 0.995).abs() < 1e-12);
            }
            other => panic!("expected training, got {:?}", other),
        }
        assert!((engine.epsilon() - 0.995).abs() < 1e-12);
    }

    #[test]
    fn test_training_targets() {
        let fits: FitLog = Arc::default();
        let mut values = vec![0.0; 9];
        values[4] = 4.0;
        values[7] = -2.0;
        let config = EngineConfig {
            batch_size: 2,
            gamma: 0.5,
            ..config()
        };
        // Five exploring picks of action 0, then replay draws experiences 0 and 1
        let rng = ScriptedRandom::new([0.0], [0, 0, 0, 0, 0, 0, 1]);
        let mut engine = OptimizationEngine::builder(config)
            .with_approximator(Box::new(RecordingApproximator {
                values,
                fits: Arc::clone(&fits),
            }))
            .with_random_source(Box::new(rng))
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap();

        let outcome = engine.optimize(NESTED).unwrap();
        assert!(outcome.training.trained());

        let fits = fits.lock().unwrap();
        assert_eq!(fits.len(), 2);

        // The successful rewrite is terminal: the target is the bare reward
        let (state, action, target) = &fits[0];
        assert_eq!(state, &StateVector::new(vec![NESTED.chars().count() as f64]));
        assert_eq!(*action, ActionId(0));
        assert_eq!(*target, 10.0);

        // The failed retry bootstraps: 0 + 0.5 * max(next values)
        let rewritten = "result = [i*j for i in range(10) for j in range(10)]";
        let (state, action, target) = &fits[1];
        assert_eq!(state, &StateVector::new(vec![rewritten.chars().count() as f64]));
        assert_eq!(*action, ActionId(0));
        assert!((target - 2.0).abs() < 1e-12, "target was {}", target);
    }

    #[test]
    fn test_epsilon_is_monotone_and_bounded() {
        let config = EngineConfig {
            batch_size: 1,
            epsilon_decay: 0.5,
            epsilon_min: 0.1,
            ..config()
        };
        let mut engine = OptimizationEngine::builder(config)
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap();

        let mut previous = engine.epsilon();
        for _ in 0..8 {
            engine.optimize(NESTED).unwrap();
            let current = engine.epsilon();
            assert!(current <= previous);
            assert!(current >= 0.1);
            previous = current;
        }
        assert_eq!(engine.epsilon(), 0.1);
        assert_eq!(engine.episodes(), 8);
    }

    #[test]
    fn test_replay_capacity_is_respected() {
        let config = EngineConfig {
            replay_capacity: Some(3),
            batch_size: 3,
            ..config()
        };
        let mut engine = scripted_engine(config, ScriptedRandom::new([0.0], [1]));

        engine.optimize(NESTED).unwrap();
        engine.optimize(NESTED).unwrap();

        assert_eq!(engine.memory().count(), 3);
        assert_eq!(engine.memory().capacity(), Some(3));
    }

    #[test]
    fn test_shape_error_escapes_and_resets_phase() {
        let mut engine = OptimizationEngine::builder(config())
            .with_encoder(Box::new(LyingEncoder))
            .with_observer(Box::new(SilentObserver))
            .build()
            .unwrap();

        let err = engine.optimize(NESTED).unwrap_err();

        assert!(matches!(
            err,
            EngineError::Shape {
                expected: 1,
                actual: 2
            }
        ));
        assert!(err.is_fatal_to_episode());
        assert_eq!(engine.phase(), LoopPhase::Idle);
        assert!(engine.memory().is_empty());
    }

    #[test]
    fn test_mismatched_approximator_is_rejected() {
        let approximator = MlpApproximator::new(3, 9, 8, 0.001, Some(1)).unwrap();
        let err = OptimizationEngine::builder(config())
            .with_encoder(Box::new(LengthEncoder))
            .with_approximator(Box::new(approximator))
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));

        let approximator = MlpApproximator::new(1, 2, 8, 0.001, Some(1)).unwrap();
        let err = OptimizationEngine::builder(config())
            .with_approximator(Box::new(approximator))
            .build()
            .unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            actions: vec!["rewrite_everything".to_string()],
            ..config()
        };
        let err = OptimizationEngine::from_config(config).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));

        // Memory that can never fill a batch would never train
        let config = EngineConfig {
            replay_capacity: Some(3),
            ..EngineConfig::default()
        };
        let err = OptimizationEngine::from_config(config).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn test_seeded_engines_are_reproducible() {
        let run = || {
            let mut engine = OptimizationEngine::builder(config())
                .with_observer(Box::new(SilentObserver))
                .build()
                .unwrap();
            engine.optimize(NESTED).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_applicable_actions() {
        let engine = scripted_engine(config(), ScriptedRandom::constant(0.5));
        let hints = engine.applicable_actions(&CodeArtifact::from(NESTED));
        assert_eq!(hints, vec!["replace_nested_loops".to_string()]);
    }
}
