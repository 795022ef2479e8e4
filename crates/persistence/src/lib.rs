//! Supabase persistence layer for the call agent
//!
//! Provides best-effort storage for:
//! - Conversation turns (caller utterance + spoken reply)
//! - Leads submitted when a call is initiated
//!
//! Everything goes through the PostgREST endpoint of a hosted Supabase
//! project; there is no schema management here.

pub mod client;
pub mod conversations;
pub mod error;
pub mod leads;

pub use client::SupabaseClient;
pub use conversations::{ConversationRecord, SupabaseRecorder};
pub use error::PersistenceError;
pub use leads::{Lead, LeadLogger};

use std::sync::Arc;
use trifivend_config::RecorderConfig;
use trifivend_core::{ConversationRecorder, NoopRecorder};

/// Build the recorder and lead logger for the configured backend
///
/// A disabled or unconfigured recorder yields a `NoopRecorder` and a lead
/// logger that drops everything.
pub fn init(config: &RecorderConfig) -> Result<PersistenceLayer, PersistenceError> {
    if !config.enabled {
        tracing::info!("Conversation recording disabled");
        return Ok(PersistenceLayer::disabled());
    }
    if config.url.is_empty() || config.api_key.is_empty() {
        tracing::warn!("Supabase credentials missing, recording disabled");
        return Ok(PersistenceLayer::disabled());
    }

    let client = SupabaseClient::new(config)?;
    tracing::info!(url = %config.url, table = %config.conversations_table, "Supabase recorder ready");

    Ok(PersistenceLayer {
        recorder: Arc::new(SupabaseRecorder::new(
            client.clone(),
            config.conversations_table.clone(),
        )),
        leads: LeadLogger::new(client, config.leads_table.clone()),
        enabled: true,
    })
}

/// Recorder plus lead logger
#[derive(Clone)]
pub struct PersistenceLayer {
    pub recorder: Arc<dyn ConversationRecorder>,
    pub leads: LeadLogger,
    enabled: bool,
}

impl PersistenceLayer {
    pub fn disabled() -> Self {
        Self {
            recorder: Arc::new(NoopRecorder),
            leads: LeadLogger::disabled(),
            enabled: false,
        }
    }

    /// Whether turns actually reach Supabase
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
