//! Agent persona and prompt configuration

use serde::{Deserialize, Serialize};
use trifivend_core::Persona;

use crate::constants::llm;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Persona used when a call has no system prompt
    #[serde(default)]
    pub persona: PersonaConfig,

    /// System prompts are trimmed to this many words
    #[serde(default = "default_word_limit")]
    pub system_prompt_word_limit: usize,

    /// Opening line offered to telephony integrations
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_word_limit() -> usize {
    llm::SYSTEM_PROMPT_WORD_LIMIT
}

fn default_greeting() -> String {
    "Hello! This is Ava from Trifivend. Quick question for you.".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona: PersonaConfig::default(),
            system_prompt_word_limit: default_word_limit(),
            greeting: default_greeting(),
        }
    }
}

/// Persona configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    #[serde(default = "default_persona_voice")]
    pub voice: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub pitch: Option<String>,
}

fn default_persona_name() -> String {
    "Ava".to_string()
}

fn default_persona_voice() -> String {
    "friendly".to_string()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            voice: default_persona_voice(),
            tone: None,
            pitch: None,
        }
    }
}

impl From<&PersonaConfig> for Persona {
    fn from(config: &PersonaConfig) -> Self {
        Persona {
            name: config.name.clone(),
            voice: config.voice.clone(),
            tone: config.tone.clone(),
            pitch: config.pitch.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_conversion() {
        let config = PersonaConfig {
            tone: Some("upbeat".to_string()),
            ..Default::default()
        };
        let persona = Persona::from(&config);
        assert_eq!(persona.name, "Ava");
        assert!(persona.system_prompt().contains("Your tone is upbeat."));
    }
}
