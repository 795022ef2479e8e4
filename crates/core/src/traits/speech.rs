//! Speech synthesis trait

use futures::Stream;
use std::pin::Pin;

use crate::{Result, VoiceConfig};

/// Raw encoded audio bytes
pub type AudioChunk = Vec<u8>;

/// Lazy, finite stream of audio chunks
pub type AudioStream<'a> = Pin<Box<dyn Stream<Item = Result<AudioChunk>> + Send + 'a>>;

/// Streaming text-to-speech interface
///
/// Implementations:
/// - `ElevenLabsSynthesizer` - ElevenLabs streaming endpoint
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Synthesize text into a stream of encoded audio chunks
    ///
    /// Chunks arrive in playback order. Failures surface as
    /// `Error::Synthesis` items.
    fn synthesize<'a>(&'a self, text: &'a str, voice: &'a VoiceConfig) -> AudioStream<'a>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
