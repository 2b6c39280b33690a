use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the refineml engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    #[error("Shape error: expected state of dimension {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },

    #[error("Insufficient data: requested {requested} experiences, only {available} stored")]
    InsufficientData { requested: usize, available: usize },

    #[error("Transformation '{action}' failed: {message}")]
    Registry { action: String, message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("IO error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl EngineError {
    /// Create a new encoding error
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a new shape error
    pub fn shape(expected: usize, actual: usize) -> Self {
        Self::Shape { expected, actual }
    }

    /// Create a new insufficient data error
    pub fn insufficient_data(requested: usize, available: usize) -> Self {
        Self::InsufficientData {
            requested,
            available,
        }
    }

    /// Create a new registry failure for the named action
    pub fn registry(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Registry {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new IO error with path context
    pub fn io_error(err: std::io::Error, path: Option<impl Into<PathBuf>>) -> Self {
        Self::Io {
            source: err,
            path: path.map(|p| p.into()),
        }
    }

    /// Create a new parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether this error is allowed to escape an optimization episode
    pub fn is_fatal_to_episode(&self) -> bool {
        matches!(self, EngineError::Shape { .. } | EngineError::Config { .. })
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::io_error(error, None::<PathBuf>)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::parse_error(error.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(error: serde_yaml::Error) -> Self {
        EngineError::parse_error(error.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(error: toml::de::Error) -> Self {
        EngineError::parse_error(error.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(error: toml::ser::Error) -> Self {
        EngineError::parse_error(error.to_string())
    }
}

/// Result type alias using EngineError
pub type EngineResult<T> = Result<T, EngineError>;

/// Contextual error mapping function
pub fn map_io_err<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> EngineError {
    let path = path.into();
    move |err| EngineError::io_error(err, Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_shape_and_config_are_fatal() {
        assert!(EngineError::shape(1, 3).is_fatal_to_episode());
        assert!(EngineError::config("empty action space").is_fatal_to_episode());
        assert!(!EngineError::insufficient_data(32, 5).is_fatal_to_episode());
        assert!(!EngineError::registry("replace_manual_sum", "boom").is_fatal_to_episode());
        assert!(!EngineError::encoding("binary artifact").is_fatal_to_episode());
    }

    #[test]
    fn test_messages_are_descriptive() {
        let err = EngineError::shape(1, 5);
        assert_eq!(
            err.to_string(),
            "Shape error: expected state of dimension 1, got 5"
        );

        let err = EngineError::insufficient_data(32, 4);
        assert!(err.to_string().contains("32"));
        assert!(err.to_string().contains("4"));
    }

    #[test]
    fn test_io_error_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = map_io_err("/tmp/missing.json")(io);
        match err {
            EngineError::Io { path, .. } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/missing.json")))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
