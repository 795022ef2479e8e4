//! Backchannel filler
//!
//! Masks generator latency: if the real reply has not produced its first
//! fragment within the configured delay, a short filler phrase is
//! synthesized and pushed to the relay queue chunk by chunk. The filler
//! stops the instant the real reply starts and never pushes audio after it.
//!
//! ```text
//! Idle -> Armed -> Suppressed -> Done
//!               -> Speaking   -> Done
//! ```

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;
use trifivend_config::OrchestrationConfig;
use trifivend_core::{AudioChunk, CallEvent, SpeechSynthesizer, VoiceConfig};

use crate::relay::AudioRelayQueue;

/// Backchannel configuration
#[derive(Debug, Clone)]
pub struct BackchannelConfig {
    pub enabled: bool,
    /// Time the real reply gets before the filler speaks
    pub delay: Duration,
    pub phrase: String,
}

impl Default for BackchannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_millis(300),
            phrase: "One sec…".to_string(),
        }
    }
}

impl From<&OrchestrationConfig> for BackchannelConfig {
    fn from(config: &OrchestrationConfig) -> Self {
        Self {
            enabled: config.backchannel_enabled,
            delay: config.backchannel_delay(),
            phrase: config.backchannel_phrase.clone(),
        }
    }
}

/// Filler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerState {
    Idle,
    /// Delay timer running
    Armed,
    /// Real reply arrived first; no filler audio
    Suppressed,
    /// Filler audio being pushed
    Speaking,
    Done,
}

/// How a filler run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillerOutcome {
    Disabled,
    Suppressed,
    /// Filler spoke; `truncated` when the real reply cut it short
    Spoken { chunks: usize, truncated: bool },
    /// Synthesis failed after `chunks` were pushed
    Failed { chunks: usize },
    Cancelled,
}

impl FillerOutcome {
    /// Number of filler chunks that reached the relay queue
    pub fn chunks(&self) -> usize {
        match self {
            FillerOutcome::Spoken { chunks, .. } | FillerOutcome::Failed { chunks } => *chunks,
            _ => 0,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FillerOutcome::Disabled => "disabled",
            FillerOutcome::Suppressed => "suppressed",
            FillerOutcome::Spoken { truncated: false, .. } => "spoken",
            FillerOutcome::Spoken { truncated: true, .. } => "truncated",
            FillerOutcome::Failed { .. } => "failed",
            FillerOutcome::Cancelled => "cancelled",
        }
    }
}

/// "First fragment produced" signal shared by a turn and its filler
///
/// Also serializes the splice point: once `set` returns, `push_filler`
/// refuses every further chunk, so filler audio can never follow real audio.
#[derive(Debug, Default)]
pub struct FirstFragmentSignal {
    started: Mutex<bool>,
    notify: Notify,
}

impl FirstFragmentSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the real reply as started
    pub fn set(&self) {
        let mut started = self.started.lock();
        if !*started {
            *started = true;
            drop(started);
            self.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        *self.started.lock()
    }

    /// Resolve once the signal is set
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_set() {
            return;
        }
        notified.await;
    }

    /// Push a filler chunk unless the real reply has started
    pub fn push_filler(&self, relay: &AudioRelayQueue, chunk: AudioChunk) -> bool {
        let started = self.started.lock();
        if *started {
            return false;
        }
        relay.push_audio(chunk)
    }
}

/// Per-turn backchannel filler
pub struct BackchannelFiller {
    config: BackchannelConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice: VoiceConfig,
    state: Mutex<FillerState>,
    /// Receives `BackchannelEmitted` when the first filler chunk is queued
    events: Option<broadcast::Sender<CallEvent>>,
}

impl BackchannelFiller {
    pub fn new(
        config: BackchannelConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        voice: VoiceConfig,
    ) -> Self {
        Self {
            config,
            synthesizer,
            voice,
            state: Mutex::new(FillerState::Idle),
            events: None,
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<CallEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> FillerState {
        *self.state.lock()
    }

    fn transition(&self, next: FillerState) {
        let mut state = self.state.lock();
        let prev = *state;
        tracing::trace!(from = ?prev, to = ?next, "Backchannel state");
        *state = next;
    }

    /// Run the filler for one turn
    ///
    /// Always ends in `Done`. Synthesis failures are logged and reported in
    /// the outcome; they never propagate.
    pub async fn run(
        &self,
        relay: &AudioRelayQueue,
        signal: &FirstFragmentSignal,
        cancel: &CancellationToken,
    ) -> FillerOutcome {
        let outcome = self.run_inner(relay, signal, cancel).await;
        self.transition(FillerState::Done);
        metrics::counter!("trifivend_backchannel_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn run_inner(
        &self,
        relay: &AudioRelayQueue,
        signal: &FirstFragmentSignal,
        cancel: &CancellationToken,
    ) -> FillerOutcome {
        if !self.config.enabled {
            return FillerOutcome::Disabled;
        }

        self.transition(FillerState::Armed);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return FillerOutcome::Cancelled,
            _ = signal.wait() => {
                self.transition(FillerState::Suppressed);
                return FillerOutcome::Suppressed;
            }
            _ = tokio::time::sleep(self.config.delay) => {}
        }

        if signal.is_set() {
            self.transition(FillerState::Suppressed);
            return FillerOutcome::Suppressed;
        }

        self.transition(FillerState::Speaking);
        tracing::debug!(phrase = %self.config.phrase, "Speaking backchannel filler");

        let mut stream = self.synthesizer.synthesize(&self.config.phrase, &self.voice);
        let mut chunks = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return if chunks == 0 {
                        FillerOutcome::Cancelled
                    } else {
                        FillerOutcome::Spoken { chunks, truncated: true }
                    };
                }
                _ = signal.wait() => return FillerOutcome::Spoken { chunks, truncated: true },
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if !signal.push_filler(relay, chunk) {
                        return FillerOutcome::Spoken { chunks, truncated: true };
                    }
                    chunks += 1;
                    if chunks == 1 {
                        if let Some(events) = &self.events {
                            let _ = events.send(CallEvent::BackchannelEmitted);
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, chunks, "Backchannel synthesis failed");
                    return FillerOutcome::Failed { chunks };
                }
                None => return FillerOutcome::Spoken { chunks, truncated: false },
            }
        }
    }
}
