// State representation for the transformation policy
// A code artifact is summarised as a fixed-length numeric vector, never parsed

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineResult;

/// Source text at a point in time. Transformations produce new artifacts,
/// so earlier states stay valid inside the replay memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeArtifact(String);

impl CodeArtifact {
    /// Create a new artifact from source text
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the source text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the text in characters
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the artifact and return the source text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for CodeArtifact {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for CodeArtifact {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl AsRef<str> for CodeArtifact {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-length feature vector derived from a [`CodeArtifact`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateVector(Vec<f64>);

impl StateVector {
    pub fn new(features: Vec<f64>) -> Self {
        Self(features)
    }

    /// Number of features in the vector
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Copy the features into an ndarray vector for the approximator
    pub fn to_array(&self) -> Array1<f64> {
        Array1::from(self.0.clone())
    }
}

impl From<Vec<f64>> for StateVector {
    fn from(features: Vec<f64>) -> Self {
        Self(features)
    }
}

/// Maps an artifact to its state vector.
///
/// Encoding must be pure: identical artifacts always yield identical vectors.
pub trait StateEncoder: Send + Sync {
    /// Length of every vector this encoder produces
    fn dimension(&self) -> usize;

    /// Encode an artifact into a state vector
    fn encode(&self, artifact: &CodeArtifact) -> EngineResult<StateVector>;
}

/// Reference encoder: the single feature is the text length
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthEncoder;

impl StateEncoder for LengthEncoder {
    fn dimension(&self) -> usize {
        1
    }

    fn encode(&self, artifact: &CodeArtifact) -> EngineResult<StateVector> {
        Ok(StateVector::new(vec![artifact.char_len() as f64]))
    }
}

/// Coarse structural summary of the artifact
///
/// Features, in order: text length, line count, deepest indentation (in
/// columns, tabs count as four), number of `for` loops and number of
/// `.append(` calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEncoder;

impl FeatureEncoder {
    const DIMENSION: usize = 5;

    fn indentation(line: &str) -> usize {
        line.chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum()
    }
}

impl StateEncoder for FeatureEncoder {
    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn encode(&self, artifact: &CodeArtifact) -> EngineResult<StateVector> {
        let text = artifact.as_str();
        let code_lines = || text.lines().filter(|line| !line.trim().is_empty());

        let line_count = text.lines().count();
        let max_indent = code_lines().map(Self::indentation).max().unwrap_or(0);
        let loop_count = code_lines()
            .filter(|line| line.trim_start().starts_with("for "))
            .count();
        let append_count = text.matches(".append(").count();

        let features = vec![
            artifact.char_len() as f64,
            line_count as f64,
            max_indent as f64,
            loop_count as f64,
            append_count as f64,
        ];

        Ok(StateVector::new(features))
    }
}

/// Encoder selection used by the configuration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    #[default]
    Length,
    Features,
}

impl EncoderKind {
    /// Build the encoder this kind names
    pub fn build(self) -> Box<dyn StateEncoder> {
        match self {
            EncoderKind::Length => Box::new(LengthEncoder),
            EncoderKind::Features => Box::new(FeatureEncoder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = "result = []\nfor i in range(10):\n for j in range(10):\n  result.append(i*j)";

    #[test]
    fn test_length_encoder_is_deterministic() {
        let artifact = CodeArtifact::from(NESTED);
        let first = LengthEncoder.encode(&artifact).unwrap();
        let second = LengthEncoder.encode(&artifact).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_slice(), &[NESTED.chars().count() as f64]);
    }

    #[test]
    fn test_empty_artifact_encodes() {
        let empty = CodeArtifact::default();
        assert_eq!(LengthEncoder.encode(&empty).unwrap().as_slice(), &[0.0]);

        let features = FeatureEncoder.encode(&empty).unwrap();
        assert_eq!(features.dimension(), 5);
        assert!(features.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        let artifact = CodeArtifact::from("naïve = 1");
        assert_eq!(LengthEncoder.encode(&artifact).unwrap().as_slice(), &[9.0]);
    }

    #[test]
    fn test_feature_encoder_summarises_structure() {
        let artifact = CodeArtifact::from(NESTED);
        let state = FeatureEncoder.encode(&artifact).unwrap();
        let features = state.as_slice();

        assert_eq!(features[1], 4.0); // lines
        assert_eq!(features[2], 2.0); // deepest indentation
        assert_eq!(features[3], 2.0); // for loops
        assert_eq!(features[4], 1.0); // append calls
        assert_eq!(state, FeatureEncoder.encode(&artifact).unwrap());
    }

    #[test]
    fn test_encoder_kind_dimensions() {
        assert_eq!(EncoderKind::Length.build().dimension(), 1);
        assert_eq!(EncoderKind::Features.build().dimension(), 5);
    }
}
