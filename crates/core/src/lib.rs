//! Core traits and types for the Trifivend call agent
//!
//! This crate provides foundational types used across all other crates:
//! - Collaborator traits (text generation, speech synthesis, conversation recording)
//! - Chat message types
//! - Voice configuration
//! - Per-call status events
//! - Error types

pub mod error;
pub mod events;
pub mod llm_types;
pub mod persona;
pub mod traits;
pub mod voice_config;

pub use error::{Error, Result};
pub use events::CallEvent;
pub use llm_types::{GenerateRequest, Message, Role};
pub use persona::Persona;
pub use voice_config::VoiceConfig;

pub use traits::{
    AudioChunk, AudioStream, ConversationRecorder, NoopRecorder, SpeechSynthesizer, TextGenerator,
    TokenStream,
};
