//! Configuration management for the call agent
//!
//! Supports loading configuration from:
//! - `config/default.{toml,yaml,json}` (optional)
//! - `config/{env}.{toml,yaml,json}` (optional)
//! - Environment variables (`TRIFIVEND__` prefix, `__` separator)
//!
//! Settings are loaded once at startup and passed down explicitly.

pub mod agent;
pub mod constants;
pub mod pipeline;
pub mod providers;
pub mod settings;

pub use agent::{AgentConfig, PersonaConfig};
pub use pipeline::OrchestrationConfig;
pub use providers::{LlmConfig, RecorderConfig, TtsConfig};
pub use settings::{
    load_settings, load_settings_from, ObservabilityConfig, RuntimeEnvironment, ServerConfig,
    Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => ConfigError::MissingField(key),
            other => ConfigError::ParseError(other.to_string()),
        }
    }
}
