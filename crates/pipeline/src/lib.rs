//! Call-turn streaming pipeline
//!
//! This crate turns a caller utterance into spoken reply audio:
//! - Fragment buffering of streamed text (sentence/length heuristics)
//! - Per-call audio relay queue with end-of-turn/end-of-call sentinels
//! - Latency-masking backchannel filler
//! - Turn orchestration with cooperative cancellation
//! - Silence-triggered continuation after the opening reply
//! - Call session registry
//! - ElevenLabs speech synthesis adapter

pub mod backchannel;
pub mod fragment;
pub mod orchestrator;
pub mod registry;
pub mod relay;
pub mod tts;
pub mod watch;

pub use backchannel::{BackchannelConfig, BackchannelFiller, FillerOutcome, FillerState, FirstFragmentSignal};
pub use fragment::{flush_fragments, FragmentBuffer, FragmentConfig, FragmentStream};
pub use orchestrator::{OrchestratorConfig, TurnOrchestrator, TurnOutcome};
pub use registry::{CallSession, CallSessionRegistry, CallSummary};
pub use relay::{AudioRelayQueue, RelayItem};
pub use tts::{split_text_for_tts, ElevenLabsSynthesizer};
pub use watch::ContinuationWatch;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Call already ended: {0}")]
    CallEnded(String),

    #[error("Too many active calls (limit {0})")]
    CapacityExceeded(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error(transparent)]
    Core(#[from] trifivend_core::Error),
}

impl From<PipelineError> for trifivend_core::Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Tts(msg) => trifivend_core::Error::Synthesis(msg),
            PipelineError::Core(e) => e,
            PipelineError::InvalidInput(msg) => trifivend_core::Error::InvalidInput(msg),
            other => trifivend_core::Error::InvalidInput(other.to_string()),
        }
    }
}
