// Configuration module for refineml
// Engine parameters with defaults, loadable from JSON, YAML or TOML

#[allow(clippy::module_inception)]
pub mod config;

pub use config::EngineConfig;
