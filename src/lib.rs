// RefineML - adaptive code-transformation advisor
// Learns which source rewrites pay off using deep Q-learning

pub mod config;
pub mod error;
pub mod logging;
pub mod reinforcement;
pub mod transform;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use logging::{init, init_with_logger};
pub use reinforcement::{
    optimize_many, CodeArtifact, EngineBuilder, OptimizationEngine, OptimizationOutcome,
};
pub use transform::{BuiltinRewrite, Transformation, TransformationRegistry};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
