//! Prompt building
//!
//! Assembles the seed conversation for a turn: the call's system prompt (or
//! the persona prompt when the call has none), the active script, prior
//! exchanges and the caller's latest utterance.

use trifivend_core::{Message, Persona};

/// Keep at most `word_limit` whitespace-separated words
///
/// Prompts within the limit come back unchanged; longer ones are re-joined
/// with single spaces.
pub fn trim_system_prompt(prompt: &str, word_limit: usize) -> String {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return String::new();
    }

    let words: Vec<&str> = prompt.split_whitespace().collect();
    if words.len() <= word_limit {
        return prompt.to_string();
    }

    tracing::debug!(words = words.len(), limit = word_limit, "Trimming system prompt");
    words[..word_limit].join(" ")
}

/// Seed conversation builder
pub struct PromptBuilder {
    messages: Vec<Message>,
    default_script_id: String,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            default_script_id: "default".to_string(),
        }
    }

    /// Script id that needs no extra instruction
    pub fn with_default_script(mut self, script_id: impl Into<String>) -> Self {
        self.default_script_id = script_id.into();
        self
    }

    /// Add the call's system prompt, falling back to the persona
    pub fn system_prompt(mut self, prompt: Option<&str>, persona: &Persona) -> Self {
        let system = match prompt.map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => persona.system_prompt(),
        };
        self.messages.push(Message::system(system));
        self
    }

    /// Name the active script unless it is the default one
    pub fn with_script(mut self, script_id: Option<&str>) -> Self {
        if let Some(id) = script_id.map(str::trim) {
            if !id.is_empty() && id != self.default_script_id {
                self.messages.push(Message::system(format!("Active script: {}", id)));
            }
        }
        self
    }

    /// Add prior exchanges
    pub fn with_history(mut self, history: &[Message]) -> Self {
        self.messages.extend(history.iter().cloned());
        self
    }

    /// Add the caller's latest utterance
    pub fn user_message(mut self, text: &str) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    /// Add something the agent already said
    pub fn assistant_message(mut self, text: &str) -> Self {
        self.messages.push(Message::assistant(text));
        self
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trifivend_core::Role;

    #[test]
    fn test_trim_within_limit_is_unchanged() {
        assert_eq!(trim_system_prompt("  Be  brief. ", 5), "Be  brief.");
        assert_eq!(trim_system_prompt("   ", 5), "");
    }

    #[test]
    fn test_trim_over_limit() {
        let prompt = "one two\tthree\nfour five";
        assert_eq!(trim_system_prompt(prompt, 3), "one two three");
    }

    #[test]
    fn test_seed_with_script() {
        let messages = PromptBuilder::new()
            .with_default_script("default")
            .system_prompt(Some("Sell solar panels."), &Persona::default())
            .with_script(Some("solar-v2"))
            .user_message("Who is this?")
            .build();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::system("Sell solar panels."));
        assert_eq!(messages[1], Message::system("Active script: solar-v2"));
        assert_eq!(messages[2].role, Role::User);
    }

    #[test]
    fn test_default_script_adds_nothing() {
        let builder = PromptBuilder::new()
            .system_prompt(None, &Persona::default())
            .with_script(Some("default"))
            .with_script(None);
        assert_eq!(builder.message_count(), 1);
    }

    #[test]
    fn test_persona_fallback() {
        let persona = Persona::new("Ava", "friendly").with_tone("upbeat");
        let messages = PromptBuilder::new().system_prompt(Some("  "), &persona).build();
        assert_eq!(
            messages[0].content,
            "You are Ava speaking in the friendly voice. Your tone is upbeat."
        );
    }

    #[test]
    fn test_continuation_seed() {
        let history = vec![Message::user("Hello?"), Message::assistant("Hi, it's Ava.")];
        let messages = PromptBuilder::new()
            .system_prompt(None, &Persona::default())
            .with_history(&history)
            .user_message("Sure")
            .assistant_message("Great, so about your roof")
            .build();

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[4], Message::assistant("Great, so about your roof"));
    }
}
