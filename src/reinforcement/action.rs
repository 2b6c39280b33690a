// Actions available to the transformation policy
// Each action is a stable index into a fixed, ordered action space

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{EngineError, EngineResult};

/// Stable index of an action inside its [`ActionSpace`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub usize);

impl ActionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed, ordered, non-empty set of action names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpace {
    names: Vec<String>,
}

impl ActionSpace {
    /// Create an action space, rejecting empty or duplicated names
    pub fn new<I, S>(names: I) -> EngineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(EngineError::config("action space must contain at least one action"));
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(EngineError::config("action names must not be blank"));
            }
            if !seen.insert(name.as_str()) {
                return Err(EngineError::config(format!("duplicate action '{}'", name)));
            }
        }

        Ok(Self { names })
    }

    /// Number of actions in the space (always at least one)
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name of an action, if the identifier belongs to this space
    pub fn name(&self, action: ActionId) -> Option<&str> {
        self.names.get(action.0).map(String::as_str)
    }

    /// Look up the identifier of a named action
    pub fn id_of(&self, name: &str) -> Option<ActionId> {
        self.names.iter().position(|n| n == name).map(ActionId)
    }

    pub fn contains(&self, action: ActionId) -> bool {
        action.0 < self.names.len()
    }

    /// Iterate over all identifiers in order
    pub fn ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        (0..self.names.len()).map(ActionId)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
