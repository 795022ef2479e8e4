//! Speech synthesis adapter

mod chunker;
mod elevenlabs;

pub use chunker::split_text_for_tts;
pub use elevenlabs::ElevenLabsSynthesizer;
