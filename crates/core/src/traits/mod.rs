//! Collaborator traits for the call agent
//!
//! The turn pipeline only talks to the outside world through these traits,
//! which keeps backends pluggable and lets tests substitute mocks.
//!
//! ```text
//!   - TextGenerator: conversation -> streamed text tokens
//!   - SpeechSynthesizer: text -> streamed audio chunks
//!   - ConversationRecorder: fire-and-forget turn logging
//! ```

mod llm;
mod recorder;
mod speech;

pub use llm::{TextGenerator, TokenStream};
pub use recorder::{ConversationRecorder, NoopRecorder};
pub use speech::{AudioChunk, AudioStream, SpeechSynthesizer};
