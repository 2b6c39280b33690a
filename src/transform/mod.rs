// Transformation registry
// Maps each action identifier to a rewrite handler and its reward

pub mod rewrites;

pub use rewrites::BuiltinRewrite;

use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::reinforcement::{
    action::{ActionId, ActionSpace},
    state::CodeArtifact,
};

/// A rewrite over source text.
///
/// `Ok(None)` means the precondition did not match. Errors are absorbed by
/// the registry and never reach the optimization loop.
pub trait Transformation: Send + Sync {
    /// Action identifier the transformation is registered under
    fn name(&self) -> &str;

    /// Rewrite `code`, or return None when nothing applies
    fn rewrite(&self, code: &str) -> EngineResult<Option<String>>;

    /// Whether the rewrite understands source in `language`
    fn supports(&self, _language: &str) -> bool {
        true
    }
}

struct RegistryEntry {
    transformation: Box<dyn Transformation>,
    reward: f64,
}

/// Ordered table of transformations; the position of an entry is its action id
#[derive(Default)]
pub struct TransformationRegistry {
    entries: Vec<RegistryEntry>,
    /// Source language of the artifacts; `None` runs every transformation
    language: Option<String>,
}

impl TransformationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of built-in handlers for the given action names
    pub fn builtin<S: AsRef<str>>(names: &[S], reward: f64) -> EngineResult<Self> {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref();
            let rewrite = BuiltinRewrite::from_name(name)
                .ok_or_else(|| EngineError::config(format!("unknown action '{}'", name)))?;
            registry.register(Box::new(rewrite), reward)?;
        }
        Ok(registry)
    }

    /// The nine reference actions, each rewarded with `reward` on success
    pub fn with_default_actions(reward: f64) -> EngineResult<Self> {
        let names: Vec<&str> = BuiltinRewrite::DEFAULT_ACTIONS
            .iter()
            .map(|rewrite| rewrite.name())
            .collect();
        Self::builtin(names.as_slice(), reward)
    }

    /// Append a transformation; its action id is its position
    pub fn register(
        &mut self,
        transformation: Box<dyn Transformation>,
        reward: f64,
    ) -> EngineResult<ActionId> {
        let name = transformation.name().to_string();
        if !(reward > 0.0) || !reward.is_finite() {
            return Err(EngineError::config(format!(
                "reward for '{}' must be a positive number, got {}",
                name, reward
            )));
        }
        if self.entries.iter().any(|e| e.transformation.name() == name) {
            return Err(EngineError::config(format!("duplicate action '{}'", name)));
        }

        self.entries.push(RegistryEntry {
            transformation,
            reward,
        });
        Ok(ActionId(self.entries.len() - 1))
    }

    /// Restrict the registry to transformations supporting `language`
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    fn enabled(&self, entry: &RegistryEntry) -> bool {
        self.language
            .as_deref()
            .map_or(true, |language| entry.transformation.supports(language))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Action space over the registered names; fails when empty
    pub fn action_space(&self) -> EngineResult<ActionSpace> {
        ActionSpace::new(self.entries.iter().map(|e| e.transformation.name().to_string()))
    }

    /// Reward granted when the action changes the artifact
    pub fn reward_of(&self, action: ActionId) -> Option<f64> {
        self.entries.get(action.index()).map(|e| e.reward)
    }

    /// Apply an action. Returns the rewritten artifact and its reward, or the
    /// unchanged artifact with reward zero when nothing applies or the
    /// handler fails.
    pub fn apply(&self, action: ActionId, artifact: &CodeArtifact) -> (CodeArtifact, f64) {
        let Some(entry) = self.entries.get(action.index()) else {
            warn!("Action {} is not registered", action);
            return (artifact.clone(), 0.0);
        };
        let name = entry.transformation.name();
        if !self.enabled(entry) {
            debug!("Action {} does not support {:?}", name, self.language);
            return (artifact.clone(), 0.0);
        }

        match entry.transformation.rewrite(artifact.as_str()) {
            Ok(Some(rewritten)) if rewritten != artifact.as_str() => {
                debug!("Transformation applied: {}", name);
                (CodeArtifact::from(rewritten), entry.reward)
            }
            Ok(_) => (artifact.clone(), 0.0),
            Err(e) => {
                warn!("Failed to apply action {}: {}", name, e);
                (artifact.clone(), 0.0)
            }
        }
    }

    /// Actions whose precondition currently matches the artifact
    pub fn applicable_actions(&self, artifact: &CodeArtifact) -> Vec<ActionId> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                self.enabled(entry)
                    && matches!(
                    entry.transformation.rewrite(artifact.as_str()),
                    Ok(Some(ref rewritten)) if rewritten != artifact.as_str()
                )
            })
            .map(|(index, _)| ActionId(index))
            .collect()
    }
}

impl std::fmt::Debug for TransformationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformationRegistry")
            .field(
                "entries",
                &self
                    .entries
                    .iter()
                    .map(|e| (e.transformation.name(), e.reward))
                    .collect::<Vec<_>>(),
            )
            .field("language", &self.language)
            .finish()
    }
}
