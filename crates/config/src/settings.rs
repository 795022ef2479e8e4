//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{AgentConfig, ConfigError, LlmConfig, OrchestrationConfig, RecorderConfig, TtsConfig};

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation
    #[default]
    Development,
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Turn pipeline configuration
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    /// Conversation log
    #[serde(default)]
    pub recorder: RecorderConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Externally reachable base URL, used to build audio and event URLs
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Calls idle for longer than this are torn down
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Maximum concurrently registered calls
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_max_calls() -> usize {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            public_base_url: None,
            session_idle_timeout_secs: default_idle_timeout(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_calls: default_max_calls(),
        }
    }
}

impl ServerConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_orchestration()?;
        self.validate_providers()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.max_calls == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_calls".to_string(),
                message: "Must allow at least 1 call".to_string(),
            });
        }

        if server.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.cleanup_interval_secs".to_string(),
                message: "Cleanup interval must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_orchestration(&self) -> Result<(), ConfigError> {
        let orchestration = &self.orchestration;

        if orchestration.max_flush_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "orchestration.max_flush_chars".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if orchestration.min_flush_chars > orchestration.max_flush_chars {
            return Err(ConfigError::InvalidValue {
                field: "orchestration.min_flush_chars".to_string(),
                message: format!(
                    "Cannot be larger than max_flush_chars ({})",
                    orchestration.max_flush_chars
                ),
            });
        }

        let window = orchestration.continuation_window_secs;
        if !window.is_finite() || window < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "orchestration.continuation_window_secs".to_string(),
                message: format!("Must be a non-negative number, got {}", window),
            });
        }

        if orchestration.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "orchestration.event_capacity".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if orchestration.backchannel_enabled && orchestration.backchannel_phrase.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "orchestration.backchannel_phrase".to_string(),
                message: "Cannot be empty when backchannel is enabled".to_string(),
            });
        }

        Ok(())
    }

    fn validate_providers(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".to_string(),
                message: format!("Must be between 0.0 and 2.0, got {}", self.llm.temperature),
            });
        }

        for (field, value) in [
            ("tts.stability", self.tts.stability),
            ("tts.similarity_boost", self.tts.similarity_boost),
            ("tts.style", self.tts.style),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if self.tts.max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.max_chars".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.environment.is_production() {
            if !self.llm.is_configured() {
                return Err(ConfigError::InvalidValue {
                    field: "llm.api_key".to_string(),
                    message: "API key must be set in production".to_string(),
                });
            }
            if !self.tts.is_configured() {
                return Err(ConfigError::InvalidValue {
                    field: "tts.api_key".to_string(),
                    message: "API key must be set in production".to_string(),
                });
            }
        }

        if self.recorder.enabled && (self.recorder.url.is_empty() || self.recorder.api_key.is_empty())
        {
            if self.environment.is_strict() {
                return Err(ConfigError::InvalidValue {
                    field: "recorder.url".to_string(),
                    message: "URL and API key are required when the recorder is enabled"
                        .to_string(),
                });
            }
            tracing::warn!("Recorder enabled without URL or API key; turns will not be logged");
        }

        Ok(())
    }
}

/// Load settings from `config/` and the environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("config"), env)
}

/// Load settings from a config directory and the environment
///
/// Priority: env vars > `{dir}/{env}.*` > `{dir}/default.*` > defaults
pub fn load_settings_from(dir: &Path, env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    let default_path = dir.join("default");
    builder = builder.add_source(File::with_name(&default_path.to_string_lossy()).required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        let env_path = dir.join(env_name);
        builder = builder.add_source(File::with_name(&env_path.to_string_lossy()).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("TRIFIVEND")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
