//! Agent persona

use serde::{Deserialize, Serialize};

/// Speaking persona used when a call supplies no system prompt of its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub voice: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub pitch: Option<String>,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Ava".to_string(),
            voice: "friendly".to_string(),
            tone: None,
            pitch: None,
        }
    }
}

impl Persona {
    pub fn new(name: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            voice: voice.into(),
            tone: None,
            pitch: None,
        }
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_pitch(mut self, pitch: impl Into<String>) -> Self {
        self.pitch = Some(pitch.into());
        self
    }

    /// Render the persona as a system prompt
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {} speaking in the {} voice.", self.name, self.voice);
        if let Some(tone) = &self.tone {
            prompt.push_str(&format!(" Your tone is {}.", tone));
        }
        if let Some(pitch) = &self.pitch {
            prompt.push_str(&format!(" Your vocal pitch is {}.", pitch));
        }
        prompt
    }
}
