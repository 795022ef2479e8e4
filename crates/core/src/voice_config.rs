//! Voice configuration types for speech synthesis

use serde::{Deserialize, Serialize};

/// Voice configuration passed to the speech synthesizer with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Provider voice identifier
    pub voice_id: String,
    /// Provider synthesis model
    pub model_id: String,
    /// Voice stability (0.0 - 1.0)
    #[serde(default = "default_stability")]
    pub stability: f32,
    /// Similarity boost (0.0 - 1.0)
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
    /// Style exaggeration (0.0 - 1.0)
    #[serde(default)]
    pub style: f32,
    #[serde(default = "default_speaker_boost")]
    pub use_speaker_boost: bool,
    /// Encoded output format, e.g. `mp3_44100_32`
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.8
}

fn default_speaker_boost() -> bool {
    true
}

fn default_output_format() -> String {
    "mp3_44100_32".to_string()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            style: 0.0,
            use_speaker_boost: default_speaker_boost(),
            output_format: default_output_format(),
        }
    }
}

impl VoiceConfig {
    /// Create a voice config for the given voice
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Set stability, clamped to 0.0 - 1.0
    pub fn with_stability(mut self, stability: f32) -> Self {
        self.stability = stability.clamp(0.0, 1.0);
        self
    }

    /// Set similarity boost, clamped to 0.0 - 1.0
    pub fn with_similarity_boost(mut self, boost: f32) -> Self {
        self.similarity_boost = boost.clamp(0.0, 1.0);
        self
    }

    /// Set style, clamped to 0.0 - 1.0
    pub fn with_style(mut self, style: f32) -> Self {
        self.style = style.clamp(0.0, 1.0);
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }
}
