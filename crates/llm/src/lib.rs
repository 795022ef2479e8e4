//! Text generation for the call agent
//!
//! Features:
//! - OpenAI-compatible streaming chat completions
//! - Shorter reply budget on the opening turn
//! - Seed conversation assembly with system-prompt trimming

pub mod backend;
pub mod prompt;

pub use backend::OpenAIGenerator;
pub use prompt::{trim_system_prompt, PromptBuilder};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Transport failures, timeouts and throttled/5xx responses
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for trifivend_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => trifivend_core::Error::Timeout,
            other => trifivend_core::Error::Generation(other.to_string()),
        }
    }
}
