//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use trifivend_config::Settings;
use trifivend_core::{SpeechSynthesizer, TextGenerator};
use trifivend_llm::OpenAIGenerator;
use trifivend_persistence::{LeadLogger, PersistenceLayer};
use trifivend_pipeline::{
    CallSessionRegistry, ElevenLabsSynthesizer, OrchestratorConfig, TurnOrchestrator,
};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup
    pub config: Arc<Settings>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub leads: LeadLogger,
    recorder_enabled: bool,
}

impl AppState {
    /// Build state with the configured OpenAI, ElevenLabs and Supabase backends
    pub fn new(config: Settings) -> Result<Self, ServerError> {
        let generator = OpenAIGenerator::new(config.llm.clone())
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let synthesizer = ElevenLabsSynthesizer::new(&config.tts)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        let persistence = trifivend_persistence::init(&config.recorder)
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(Self::with_components(
            config,
            Arc::new(generator),
            Arc::new(synthesizer),
            persistence,
        ))
    }

    /// Build state around explicit collaborators
    pub fn with_components(
        config: Settings,
        generator: Arc<dyn TextGenerator>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        persistence: PersistenceLayer,
    ) -> Self {
        let registry = Arc::new(CallSessionRegistry::new(
            config.server.max_calls,
            config.orchestration.event_capacity,
        ));
        let orchestrator = TurnOrchestrator::new(
            registry,
            generator,
            synthesizer,
            persistence.recorder.clone(),
            OrchestratorConfig::from(&config),
        );

        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            recorder_enabled: persistence.is_enabled(),
            leads: persistence.leads,
        }
    }

    pub fn registry(&self) -> &Arc<CallSessionRegistry> {
        self.orchestrator.registry()
    }

    pub fn recorder_enabled(&self) -> bool {
        self.recorder_enabled
    }

    /// Base for audio and event URLs handed back to the caller
    pub fn public_base_url(&self) -> &str {
        self.config
            .server
            .public_base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or("")
    }
}
