// Main module for the reinforcement learning components
// Deep Q-learning over a registry of code transformations

pub mod action;
pub mod approximator;
pub mod checkpoint;
pub mod engine;
pub mod observer;
pub mod parallel;
pub mod policy;
pub mod random;
pub mod replay;
pub mod state;

// Re-export main components for easier access
pub use action::{ActionId, ActionSpace};
pub use approximator::{MlpApproximator, ValueApproximator};
pub use checkpoint::EngineCheckpoint;
pub use engine::{EngineBuilder, LoopPhase, OptimizationEngine, OptimizationOutcome, TrainingOutcome};
pub use observer::{EpisodeObserver, SilentObserver, TracingObserver};
pub use parallel::optimize_many;
pub use policy::{EpsilonGreedy, Policy};
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
pub use replay::{Experience, ReplayMemory};
pub use state::{CodeArtifact, EncoderKind, StateEncoder, StateVector};

use crate::config::EngineConfig;
use crate::error::EngineResult;

/// Initialize an engine with the default parameters and the nine
/// built-in transformations
pub fn initialize_engine() -> EngineResult<OptimizationEngine> {
    OptimizationEngine::from_config(EngineConfig::default())
}
