//! External service settings
//!
//! API keys fall back to the conventional provider environment variables
//! (`OPENAI_API_KEY`, `ELEVENLABS_API_KEY`, `SUPABASE_URL`, `SUPABASE_KEY`)
//! when not set through the config sources.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use trifivend_core::VoiceConfig;

use crate::constants::{endpoints, llm, tts};

fn env_or_empty(name: &str) -> String {
    std::env::var(name).unwrap_or_default()
}

/// OpenAI-compatible chat completions settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_api_key")]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Reply budget for the opening turn
    #[serde(default = "default_first_turn_max_tokens")]
    pub first_turn_max_tokens: u32,

    /// Reply budget for later turns (provider default when unset)
    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Connection retries before the first token
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

fn default_llm_endpoint() -> String {
    endpoints::LLM_DEFAULT.to_string()
}

fn default_llm_api_key() -> String {
    env_or_empty("OPENAI_API_KEY")
}

fn default_llm_model() -> String {
    llm::MODEL.to_string()
}

fn default_temperature() -> f32 {
    llm::TEMPERATURE
}

fn default_first_turn_max_tokens() -> u32 {
    llm::FIRST_TURN_MAX_TOKENS
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_llm_retries() -> u32 {
    2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: default_llm_api_key(),
            model: default_llm_model(),
            temperature: default_temperature(),
            first_turn_max_tokens: default_first_turn_max_tokens(),
            max_tokens: None,
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() || self.endpoint.starts_with("http://localhost")
    }
}

/// ElevenLabs speech synthesis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_tts_api_key")]
    pub api_key: String,

    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_stability")]
    pub stability: f32,

    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    #[serde(default)]
    pub style: f32,

    #[serde(default = "default_true")]
    pub use_speaker_boost: bool,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default = "default_tts_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_tts_retries")]
    pub max_retries: u32,

    /// Linear backoff step between retries
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Longest text sent in one request
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_tts_endpoint() -> String {
    endpoints::TTS_DEFAULT.to_string()
}

fn default_tts_api_key() -> String {
    env_or_empty("ELEVENLABS_API_KEY")
}

fn default_voice_id() -> String {
    tts::VOICE_ID.to_string()
}

fn default_model_id() -> String {
    tts::MODEL_ID.to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.8
}

fn default_true() -> bool {
    true
}

fn default_output_format() -> String {
    tts::OUTPUT_FORMAT.to_string()
}

fn default_tts_timeout() -> u64 {
    15
}

fn default_tts_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    800
}

fn default_max_chars() -> usize {
    tts::MAX_CHARS
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: default_tts_endpoint(),
            api_key: default_tts_api_key(),
            voice_id: default_voice_id(),
            model_id: default_model_id(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: 0.0,
            use_speaker_boost: true,
            output_format: default_output_format(),
            timeout_secs: default_tts_timeout(),
            max_retries: default_tts_retries(),
            retry_backoff_ms: default_retry_backoff(),
            max_chars: default_max_chars(),
        }
    }
}

impl TtsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Voice parameters sent with every synthesis request
    pub fn voice(&self) -> VoiceConfig {
        let mut voice = VoiceConfig::new(self.voice_id.clone())
            .with_model(self.model_id.clone())
            .with_stability(self.stability)
            .with_similarity_boost(self.similarity_boost)
            .with_style(self.style)
            .with_output_format(self.output_format.clone());
        voice.use_speaker_boost = self.use_speaker_boost;
        voice
    }
}

/// Hosted conversation log (Supabase) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Disabled recorders drop every turn
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_supabase_url")]
    pub url: String,

    #[serde(default = "default_supabase_key")]
    pub api_key: String,

    #[serde(default = "default_conversations_table")]
    pub conversations_table: String,

    #[serde(default = "default_leads_table")]
    pub leads_table: String,

    #[serde(default = "default_recorder_timeout")]
    pub timeout_secs: u64,
}

fn default_supabase_url() -> String {
    env_or_empty("SUPABASE_URL")
}

fn default_supabase_key() -> String {
    env_or_empty("SUPABASE_KEY")
}

fn default_conversations_table() -> String {
    "conversations".to_string()
}

fn default_leads_table() -> String {
    "leads".to_string()
}

fn default_recorder_timeout() -> u64 {
    10
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_supabase_url(),
            api_key: default_supabase_key(),
            conversations_table: default_conversations_table(),
            leads_table: default_leads_table(),
            timeout_secs: default_recorder_timeout(),
        }
    }
}

impl RecorderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
