// Parallel optimization
// Runs one independent engine per artifact on the rayon thread pool

use rayon::prelude::*;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::reinforcement::engine::{OptimizationEngine, OptimizationOutcome};
use crate::reinforcement::state::CodeArtifact;

/// Optimize every artifact with its own freshly built engine.
///
/// Engines share nothing. With a configured seed, the engine for the
/// artifact at `index` is seeded with `seed + index`, so results do not
/// depend on scheduling. Outcomes keep the input order.
pub fn optimize_many(
    artifacts: &[CodeArtifact],
    config: &EngineConfig,
) -> EngineResult<Vec<OptimizationOutcome>> {
    config.validate()?;
    info!("Optimizing {} artifacts in parallel", artifacts.len());

    artifacts
        .par_iter()
        .enumerate()
        .map(|(index, artifact)| {
            let engine_config = EngineConfig {
                seed: config.seed.map(|seed| seed.wrapping_add(index as u64)),
                ..config.clone()
            };
            let mut engine = OptimizationEngine::from_config(engine_config)?;
            engine.optimize(artifact.clone())
        })
        .collect()
}
