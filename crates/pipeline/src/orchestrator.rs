//! Turn orchestrator
//!
//! Drives one caller utterance to spoken reply audio:
//! - cancels and awaits the previous turn for the call
//! - runs the backchannel filler alongside generation
//! - streams fragments from the text generator into speech synthesis
//! - closes the turn on the relay queue no matter how it ended
//! - after the opening reply, waits out the continuation window and
//!   speaks one unprompted follow-up if the caller stays quiet
//!
//! Failures never escape a turn; they become `error` events.

use futures::{FutureExt, Stream, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use trifivend_config::Settings;
use trifivend_core::{
    AudioChunk, CallEvent, ConversationRecorder, Message, Persona, SpeechSynthesizer, TextGenerator,
    VoiceConfig,
};
use trifivend_llm::{trim_system_prompt, PromptBuilder};

use crate::backchannel::{BackchannelConfig, BackchannelFiller, FirstFragmentSignal};
use crate::fragment::{flush_fragments, FragmentConfig};
use crate::registry::{CallSession, CallSessionRegistry};
use crate::PipelineError;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub fragment: FragmentConfig,
    pub backchannel: BackchannelConfig,
    /// Silence that triggers a follow-up after the opening reply; zero disables
    pub continuation_window: Duration,
    pub voice: VoiceConfig,
    pub default_script_id: String,
    pub system_prompt_word_limit: usize,
    /// Prompt source for calls without a system prompt
    pub persona: Persona,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fragment: FragmentConfig::default(),
            backchannel: BackchannelConfig::default(),
            continuation_window: Duration::from_secs(2),
            voice: VoiceConfig::default(),
            default_script_id: "default".to_string(),
            system_prompt_word_limit: 300,
            persona: Persona::default(),
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            fragment: FragmentConfig::from(&settings.orchestration),
            backchannel: BackchannelConfig::from(&settings.orchestration),
            continuation_window: settings.orchestration.continuation_window(),
            voice: settings.tts.voice(),
            default_script_id: settings.orchestration.default_script_id.clone(),
            system_prompt_word_limit: settings.agent.system_prompt_word_limit,
            persona: Persona::from(&settings.agent.persona),
        }
    }
}

/// How a turn task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply spoken; `continued` when a follow-up was spoken after silence
    Completed { reply: String, continued: bool },
    /// The generator produced no text
    Empty,
    /// Superseded by a newer utterance or the call ended
    Cancelled,
    Failed(String),
}

impl TurnOutcome {
    fn label(&self) -> &'static str {
        match self {
            TurnOutcome::Completed { .. } => "completed",
            TurnOutcome::Empty => "empty",
            TurnOutcome::Cancelled => "cancelled",
            TurnOutcome::Failed(_) => "failed",
        }
    }
}

/// Collaborators shared by every turn task
struct TurnContext {
    generator: Arc<dyn TextGenerator>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    recorder: Arc<dyn ConversationRecorder>,
    config: OrchestratorConfig,
}

/// Text spoken by one pass over the generator
struct Spoken {
    text: String,
    cancelled: bool,
    failed: Option<String>,
}

/// Call-turn coordinator
pub struct TurnOrchestrator {
    registry: Arc<CallSessionRegistry>,
    context: Arc<TurnContext>,
}

impl TurnOrchestrator {
    pub fn new(
        registry: Arc<CallSessionRegistry>,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recorder: Arc<dyn ConversationRecorder>,
        config: OrchestratorConfig,
    ) -> Self {
        tracing::info!(
            model = generator.model_name(),
            tts = synthesizer.model_name(),
            continuation_secs = config.continuation_window.as_secs_f64(),
            "Turn orchestrator ready"
        );
        Self {
            registry,
            context: Arc::new(TurnContext {
                generator,
                synthesizer,
                recorder,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<CallSessionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.context.config
    }

    /// Register a call with its script and prompt
    ///
    /// The prompt is trimmed to the configured word budget. Calling this for
    /// a call that already has a session returns that session unchanged.
    pub fn on_call_started(
        &self,
        call_id: &str,
        script_id: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<Arc<CallSession>, PipelineError> {
        let system_prompt = system_prompt
            .map(|p| trim_system_prompt(&p, self.context.config.system_prompt_word_limit))
            .filter(|p| !p.is_empty());
        let script_id = script_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let (session, created) = self
            .registry
            .get_or_create_with(call_id, script_id, system_prompt)?;

        if created {
            tracing::info!(call_id = %call_id, script_id = ?session.script_id(), "Call started");
            session.emit(CallEvent::CallStarted {
                script_id: session.script_id().map(str::to_string),
            });
        }
        Ok(session)
    }

    /// Start a turn for a caller utterance
    ///
    /// Returns once the previous turn for the call has been cancelled and the
    /// new turn task is running. The returned number is the new turn count.
    pub async fn on_caller_utterance(&self, call_id: &str, text: &str) -> Result<u32, PipelineError> {
        let utterance = text.trim();
        if utterance.is_empty() {
            return Err(PipelineError::InvalidInput("empty utterance".to_string()));
        }

        let session = self.registry.get_or_create(call_id)?;
        session.notify_activity();

        let context = self.context.clone();
        let task_session = session.clone();
        let utterance = utterance.to_string();

        let turn = session
            .replace_turn(move |turn, cancel| {
                tokio::spawn(run_turn(context, task_session, utterance, turn, cancel))
            })
            .await?;

        metrics::counter!("trifivend_turns_started_total").increment(1);
        tracing::info!(call_id = %call_id, turn, "Turn started");
        Ok(turn)
    }

    /// Tear down a call; false when the call is unknown
    pub async fn on_call_ended(&self, call_id: &str) -> bool {
        let removed = self.registry.remove(call_id).await.is_some();
        if removed {
            tracing::info!(call_id = %call_id, "Call ended");
        }
        removed
    }

    /// Audio for the call's current turn
    pub fn poll_audio(
        &self,
        call_id: &str,
    ) -> Result<impl Stream<Item = AudioChunk> + Send + 'static, PipelineError> {
        let session = self
            .registry
            .get(call_id)
            .ok_or_else(|| PipelineError::CallNotFound(call_id.to_string()))?;
        Ok(session.relay().poll_audio())
    }

    /// Status events for a call
    pub fn subscribe(&self, call_id: &str) -> Result<broadcast::Receiver<CallEvent>, PipelineError> {
        self.registry
            .get(call_id)
            .map(|session| session.subscribe())
            .ok_or_else(|| PipelineError::CallNotFound(call_id.to_string()))
    }

    /// Publish an externally sourced event (telephony status) for a call
    pub fn emit(&self, call_id: &str, event: CallEvent) -> bool {
        match self.registry.get(call_id) {
            Some(session) => {
                session.emit(event);
                true
            }
            None => false,
        }
    }
}

/// Turn task entry point
///
/// Contains panics so the relay queue still gets its sentinel.
async fn run_turn(
    context: Arc<TurnContext>,
    session: Arc<CallSession>,
    utterance: String,
    turn: u32,
    cancel: CancellationToken,
) -> TurnOutcome {
    let result = AssertUnwindSafe(context.turn(&session, &utterance, turn, &cancel))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "turn task panicked".to_string());
            tracing::error!(call_id = %session.call_id(), turn, detail = %detail, "Turn task panicked");
            session.emit(CallEvent::Error {
                detail: detail.clone(),
            });
            TurnOutcome::Failed(detail)
        }
    };

    // a closed call gets EndOfCall from the registry instead
    if !session.is_closed() {
        session.relay().end_turn();
    }
    metrics::counter!("trifivend_turns_total", "outcome" => outcome.label()).increment(1);
    tracing::debug!(call_id = %session.call_id(), turn, outcome = outcome.label(), "Turn finished");
    outcome
}

impl TurnContext {
    /// Seed conversation: prompt, script, prior exchanges, latest utterance
    fn seed(&self, session: &CallSession, history: &[Message], utterance: &str) -> PromptBuilder {
        PromptBuilder::new()
            .with_default_script(self.config.default_script_id.clone())
            .system_prompt(session.system_prompt(), &self.config.persona)
            .with_script(session.script_id())
            .with_history(history)
            .user_message(utterance)
    }

    async fn turn(
        &self,
        session: &CallSession,
        utterance: &str,
        turn: u32,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let is_first_turn = turn == 1;
        let started = Instant::now();
        session.emit(CallEvent::TurnStarted { turn });

        let history = session.history();
        let seed = self.seed(session, &history, utterance).build();

        let signal = FirstFragmentSignal::new();
        let filler = BackchannelFiller::new(
            self.config.backchannel.clone(),
            self.synthesizer.clone(),
            self.config.voice.clone(),
        )
        .with_events(session.event_sender());
        let filler_cancel = cancel.child_token();

        let (_, spoken) = tokio::join!(
            filler.run(session.relay(), &signal, &filler_cancel),
            async {
                let spoken = self
                    .speak(session, &seed, is_first_turn, &signal, cancel, Some(started))
                    .await;
                // no filler audio once generation is over
                signal.set();
                spoken
            }
        );

        if spoken.cancelled {
            tracing::debug!(call_id = %session.call_id(), turn, "Turn cancelled");
            return TurnOutcome::Cancelled;
        }

        session.relay().end_turn();

        if spoken.text.is_empty() {
            return match spoken.failed {
                Some(detail) => TurnOutcome::Failed(detail),
                None => TurnOutcome::Empty,
            };
        }

        let reply = spoken.text;
        tracing::info!(
            call_id = %session.call_id(),
            turn,
            chars = reply.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Reply spoken"
        );
        session.emit(CallEvent::ReplyReady {
            text: reply.clone(),
        });
        self.record(session.call_id(), utterance, &reply);
        session.push_history([Message::user(utterance), Message::assistant(reply.as_str())]);

        let window = self.config.continuation_window;
        if !is_first_turn || window.is_zero() {
            return TurnOutcome::Completed {
                reply,
                continued: false,
            };
        }

        let continued = self
            .continue_after_silence(session, &history, utterance, &reply, window, cancel)
            .await;
        TurnOutcome::Completed { reply, continued }
    }

    /// Wait for caller activity and speak a follow-up if none arrives
    async fn continue_after_silence(
        &self,
        session: &CallSession,
        history: &[Message],
        utterance: &str,
        reply: &str,
        window: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let watch = session.arm_activity_watch();
        let fired = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            fired = watch.wait(window) => fired,
        };
        if fired {
            tracing::debug!(call_id = %session.call_id(), "Caller spoke within continuation window");
            return false;
        }

        tracing::info!(call_id = %session.call_id(), "Caller silent, continuing");
        let seed = self
            .seed(session, history, utterance)
            .assistant_message(reply)
            .build();

        // the follow-up opens its relay segment with its first chunk
        let signal = FirstFragmentSignal::new();
        let spoken = self.speak(session, &seed, true, &signal, cancel, None).await;
        if spoken.cancelled {
            return false;
        }
        session.relay().end_turn();

        if spoken.text.is_empty() {
            return false;
        }

        metrics::counter!("trifivend_continuations_total").increment(1);
        session.push_history([Message::assistant(spoken.text.as_str())]);
        session.emit(CallEvent::ContinuationEmitted { text: spoken.text });
        true
    }

    /// Generate text, synthesize each fragment and push its audio
    ///
    /// `first_audio_since` records time-to-first-audio for the turn.
    async fn speak(
        &self,
        session: &CallSession,
        seed: &[Message],
        is_first_turn: bool,
        signal: &FirstFragmentSignal,
        cancel: &CancellationToken,
        mut first_audio_since: Option<Instant>,
    ) -> Spoken {
        let tokens = self.generator.generate(seed, is_first_turn);
        let mut fragments = flush_fragments(tokens, self.config.fragment.clone());
        let mut spoken = Spoken {
            text: String::new(),
            cancelled: false,
            failed: None,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    spoken.cancelled = true;
                    return spoken;
                }
                next = fragments.next() => next,
            };

            let fragment = match next {
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => {
                    tracing::warn!(call_id = %session.call_id(), error = %e, "Text generation failed");
                    metrics::counter!("trifivend_generation_errors_total").increment(1);
                    session.emit(CallEvent::Error {
                        detail: format!("generation: {}", e),
                    });
                    spoken.failed = Some(e.to_string());
                    return spoken;
                }
                None => return spoken,
            };

            // real audio starts here; the filler pushes nothing after this
            signal.set();

            let mut audio = self.synthesizer.synthesize(&fragment, &self.config.voice);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        spoken.cancelled = true;
                        return spoken;
                    }
                    next = audio.next() => next,
                };

                match next {
                    Some(Ok(chunk)) => {
                        if !session.relay().push_audio(chunk) {
                            // call ended underneath us
                            spoken.cancelled = true;
                            return spoken;
                        }
                        if let Some(since) = first_audio_since.take() {
                            metrics::histogram!("trifivend_time_to_first_audio_seconds")
                                .record(since.elapsed().as_secs_f64());
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            call_id = %session.call_id(),
                            error = %e,
                            fragment = %fragment,
                            "Fragment synthesis failed, skipping"
                        );
                        metrics::counter!("trifivend_synthesis_errors_total").increment(1);
                        session.emit(CallEvent::Error {
                            detail: format!("synthesis: {}", e),
                        });
                        break;
                    }
                    None => break,
                }
            }

            if !spoken.text.is_empty() {
                spoken.text.push(' ');
            }
            spoken.text.push_str(&fragment);
        }
    }

    /// Fire-and-forget conversation record
    fn record(&self, call_id: &str, utterance: &str, reply: &str) {
        let recorder = self.recorder.clone();
        let call_id = call_id.to_string();
        let utterance = utterance.to_string();
        let reply = reply.to_string();
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&call_id, &utterance, &reply).await {
                tracing::warn!(call_id = %call_id, error = %e, "Failed to record turn");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayItem;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use trifivend_core::{AudioStream, Error, TokenStream};

    /// Replies with fixed tokens, one per `interval`
    struct ScriptedGenerator {
        tokens: Vec<&'static str>,
        interval: Duration,
        seeds: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedGenerator {
        fn new(tokens: Vec<&'static str>, interval_ms: u64) -> Self {
            Self {
                tokens,
                interval: Duration::from_millis(interval_ms),
                seeds: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate<'a>(&'a self, turns: &'a [Message], _is_first_turn: bool) -> TokenStream<'a> {
            self.seeds.lock().push(turns.to_vec());
            Box::pin(async_stream::stream! {
                for token in &self.tokens {
                    tokio::time::sleep(self.interval).await;
                    yield Ok(token.to_string());
                }
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    /// Yields `tokens`, then fails
    struct FailingGenerator {
        tokens: Vec<&'static str>,
    }

    impl TextGenerator for FailingGenerator {
        fn generate<'a>(&'a self, _turns: &'a [Message], _is_first_turn: bool) -> TokenStream<'a> {
            Box::pin(async_stream::stream! {
                for token in &self.tokens {
                    yield Ok(token.to_string());
                }
                yield Err(Error::Generation("upstream reset".to_string()));
            })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct PanickingGenerator;

    impl TextGenerator for PanickingGenerator {
        fn generate<'a>(&'a self, _turns: &'a [Message], _is_first_turn: bool) -> TokenStream<'a> {
            Box::pin(futures::stream::poll_fn(
                |_| -> std::task::Poll<Option<trifivend_core::Result<String>>> { panic!("generator exploded") },
            ))
        }

        fn model_name(&self) -> &str {
            "panicking"
        }
    }

    /// Echoes the text back as a single chunk
    struct EchoSynth;

    impl SpeechSynthesizer for EchoSynth {
        fn synthesize<'a>(&'a self, text: &'a str, _voice: &'a VoiceConfig) -> AudioStream<'a> {
            Box::pin(futures::stream::once(async move { Ok(text.as_bytes().to_vec()) }))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    /// Fails for text containing "bad"
    struct PickySynth;

    impl SpeechSynthesizer for PickySynth {
        fn synthesize<'a>(&'a self, text: &'a str, _voice: &'a VoiceConfig) -> AudioStream<'a> {
            let item = if text.contains("bad") {
                Err(Error::Synthesis("unsupported".to_string()))
            } else {
                Ok(text.as_bytes().to_vec())
            };
            Box::pin(futures::stream::once(async move { item }))
        }

        fn model_name(&self) -> &str {
            "picky"
        }
    }

    #[derive(Default)]
    struct MemoryRecorder {
        turns: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ConversationRecorder for MemoryRecorder {
        async fn record(&self, call_id: &str, caller: &str, reply: &str) -> trifivend_core::Result<()> {
            self.turns
                .lock()
                .push((call_id.to_string(), caller.to_string(), reply.to_string()));
            Ok(())
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            fragment: FragmentConfig::new(6, 80),
            backchannel: BackchannelConfig {
                enabled: false,
                ..BackchannelConfig::default()
            },
            continuation_window: Duration::ZERO,
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recorder: Arc<dyn ConversationRecorder>,
        config: OrchestratorConfig,
    ) -> TurnOrchestrator {
        let registry = Arc::new(CallSessionRegistry::new(16, 64));
        TurnOrchestrator::new(registry, generator, synthesizer, recorder, config)
    }

    fn error_details(events: &mut broadcast::Receiver<CallEvent>) -> Vec<String> {
        let mut details = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let CallEvent::Error { detail } = event {
                details.push(detail);
            }
        }
        details
    }

    /// Nothing further arrives on the relay queue
    async fn assert_relay_quiet(session: &CallSession) {
        let next = tokio::time::timeout(Duration::from_millis(50), session.relay().pop()).await;
        assert!(next.is_err(), "unexpected relay item {:?}", next);
    }

    async fn drain_turn(session: &CallSession) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match session.relay().pop().await {
                RelayItem::Audio(chunk) => out.push(String::from_utf8(chunk).unwrap()),
                _ => return out,
            }
        }
    }

    #[tokio::test]
    async fn test_single_turn_speaks_and_records() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["Hi", ", ", "there", ". ", "How", " are", " you", "?"], 1));
        let recorder = Arc::new(MemoryRecorder::default());
        let orchestrator = orchestrator(generator.clone(), Arc::new(EchoSynth), recorder.clone(), config());

        orchestrator
            .on_call_started("CA1", Some("solar".into()), Some("Sell solar.".into()))
            .unwrap();
        let turn = orchestrator.on_caller_utterance("CA1", "Who is this?").await.unwrap();
        assert_eq!(turn, 1);

        let session = orchestrator.registry().get("CA1").unwrap();
        let outcome = session.join_active_turn().await.unwrap();
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                reply: "Hi, there. How are you?".to_string(),
                continued: false
            }
        );
        assert_eq!(drain_turn(&session).await, vec!["Hi, there.", "How are you?"]);

        let seed = generator.seeds.lock()[0].clone();
        assert_eq!(seed[0], Message::system("Sell solar."));
        assert_eq!(seed[1], Message::system("Active script: solar"));
        assert_eq!(seed[2], Message::user("Who is this?"));

        // recording is spawned; give it a moment
        tokio::time::sleep(Duration::from_millis(20)).await;
        let turns = recorder.turns.lock().clone();
        assert_eq!(
            turns,
            vec![("CA1".to_string(), "Who is this?".to_string(), "Hi, there. How are you?".to_string())]
        );
    }

    #[tokio::test]
    async fn test_history_seeds_next_turn() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["Sure."], 1));
        let orchestrator = orchestrator(generator.clone(), Arc::new(EchoSynth), Arc::new(MemoryRecorder::default()), config());

        orchestrator.on_caller_utterance("CA1", "Hello?").await.unwrap();
        let session = orchestrator.registry().get("CA1").unwrap();
        session.join_active_turn().await.unwrap();
        orchestrator.on_caller_utterance("CA1", "Go on").await.unwrap();
        session.join_active_turn().await.unwrap();

        let seeds = generator.seeds.lock().clone();
        let second = &seeds[1];
        // persona prompt, then the first exchange, then the new utterance
        assert_eq!(second[0].content, Persona::default().system_prompt());
        assert_eq!(second[1], Message::user("Hello?"));
        assert_eq!(second[2], Message::assistant("Sure."));
        assert_eq!(second[3], Message::user("Go on"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_skips_fragment() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["This is bad. ", "This is fine."], 1));
        let orchestrator = orchestrator(generator, Arc::new(PickySynth), Arc::new(MemoryRecorder::default()), config());

        let session = orchestrator.on_call_started("CA1", None, None).unwrap();
        let mut events = session.subscribe();
        orchestrator.on_caller_utterance("CA1", "hi").await.unwrap();
        let outcome = session.join_active_turn().await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
        assert_eq!(drain_turn(&session).await, vec!["This is fine."]);

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if let CallEvent::Error { detail } = event {
                assert!(detail.starts_with("synthesis"));
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn test_blank_utterance_rejected() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGenerator::new(vec![], 1)),
            Arc::new(EchoSynth),
            Arc::new(MemoryRecorder::default()),
            config(),
        );
        assert!(matches!(
            orchestrator.on_caller_utterance("CA1", "  ").await,
            Err(PipelineError::InvalidInput(_))
        ));
        assert_eq!(orchestrator.registry().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_reply_still_ends_turn() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGenerator::new(vec!["  "], 1)),
            Arc::new(EchoSynth),
            Arc::new(MemoryRecorder::default()),
            config(),
        );
        orchestrator.on_caller_utterance("CA1", "hello").await.unwrap();
        let session = orchestrator.registry().get("CA1").unwrap();
        assert_eq!(session.join_active_turn().await, Some(TurnOutcome::Empty));
        assert_eq!(session.relay().pop().await, RelayItem::EndOfTurn);
    }

    #[tokio::test]
    async fn test_prompt_is_trimmed_on_start() {
        let mut config = config();
        config.system_prompt_word_limit = 2;
        let orchestrator = orchestrator(
            Arc::new(ScriptedGenerator::new(vec![], 1)),
            Arc::new(EchoSynth),
            Arc::new(MemoryRecorder::default()),
            config,
        );
        let session = orchestrator
            .on_call_started("CA1", None, Some("one two three".into()))
            .unwrap();
        assert_eq!(session.system_prompt(), Some("one two"));
    }

    #[tokio::test]
    async fn test_unknown_call() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGenerator::new(vec![], 1)),
            Arc::new(EchoSynth),
            Arc::new(MemoryRecorder::default()),
            config(),
        );
        assert!(matches!(orchestrator.poll_audio("nope"), Err(PipelineError::CallNotFound(_))));
        assert!(orchestrator.subscribe("nope").is_err());
        assert!(!orchestrator.emit("nope", CallEvent::CallEnded));
        assert!(!orchestrator.on_call_ended("nope").await);
    }

    #[tokio::test]
    async fn test_generation_error_keeps_partial_reply() {
        let recorder = Arc::new(MemoryRecorder::default());
        let orchestrator = orchestrator(
            Arc::new(FailingGenerator {
                tokens: vec!["Hello there. ", "And"],
            }),
            Arc::new(EchoSynth),
            recorder.clone(),
            config(),
        );

        let session = orchestrator.on_call_started("CA1", None, None).unwrap();
        let mut events = session.subscribe();
        orchestrator.on_caller_utterance("CA1", "hi").await.unwrap();
        let outcome = session.join_active_turn().await.unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                reply: "Hello there.".to_string(),
                continued: false
            }
        );
        assert_eq!(drain_turn(&session).await, vec!["Hello there."]);
        assert_relay_quiet(&session).await;

        let details = error_details(&mut events);
        assert_eq!(details.len(), 1);
        assert!(details[0].starts_with("generation"), "{}", details[0]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            recorder.turns.lock().clone(),
            vec![("CA1".to_string(), "hi".to_string(), "Hello there.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_generation_error_before_any_text() {
        let recorder = Arc::new(MemoryRecorder::default());
        let orchestrator = orchestrator(
            Arc::new(FailingGenerator { tokens: vec![] }),
            Arc::new(EchoSynth),
            recorder.clone(),
            config(),
        );

        let session = orchestrator.on_call_started("CA1", None, None).unwrap();
        let mut events = session.subscribe();
        orchestrator.on_caller_utterance("CA1", "hi").await.unwrap();
        let outcome = session.join_active_turn().await.unwrap();

        assert!(matches!(outcome, TurnOutcome::Failed(_)), "{:?}", outcome);
        assert_eq!(session.relay().pop().await, RelayItem::EndOfTurn);
        assert_relay_quiet(&session).await;
        assert!(error_details(&mut events)[0].starts_with("generation"));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.turns.lock().is_empty());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_turn_is_contained() {
        let orchestrator = orchestrator(
            Arc::new(PanickingGenerator),
            Arc::new(EchoSynth),
            Arc::new(MemoryRecorder::default()),
            config(),
        );

        let session = orchestrator.on_call_started("CA1", None, None).unwrap();
        let mut events = session.subscribe();
        orchestrator.on_caller_utterance("CA1", "hi").await.unwrap();
        let outcome = session.join_active_turn().await.unwrap();

        assert_eq!(outcome, TurnOutcome::Failed("generator exploded".to_string()));
        assert_eq!(session.relay().pop().await, RelayItem::EndOfTurn);
        assert_relay_quiet(&session).await;
        assert_eq!(error_details(&mut events), vec!["generator exploded".to_string()]);

        // the call survives and takes the next utterance
        assert_eq!(orchestrator.on_caller_utterance("CA1", "hello?").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_call_started_emitted_once() {
        let orchestrator = orchestrator(
            Arc::new(ScriptedGenerator::new(vec![], 1)),
            Arc::new(EchoSynth),
            Arc::new(MemoryRecorder::default()),
            config(),
        );

        let session = orchestrator.on_call_started("CA1", Some("solar".into()), None).unwrap();
        let mut events = session.subscribe();
        let again = orchestrator.on_call_started("CA1", Some("other".into()), None).unwrap();

        assert!(Arc::ptr_eq(&session, &again));
        assert_eq!(again.script_id(), Some("solar"));
        assert!(events.try_recv().is_err());
    }
}
