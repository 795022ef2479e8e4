//! Conversation recording trait

use async_trait::async_trait;

use crate::Result;

/// Persists completed turns
///
/// Callers treat this as fire-and-forget: errors are logged and never
/// reach the caller-facing flow.
#[async_trait]
pub trait ConversationRecorder: Send + Sync + 'static {
    /// Record one exchange for a call
    async fn record(&self, call_id: &str, caller_utterance: &str, reply_text: &str) -> Result<()>;
}

/// Recorder that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

#[async_trait]
impl ConversationRecorder for NoopRecorder {
    async fn record(&self, _call_id: &str, _caller_utterance: &str, _reply_text: &str) -> Result<()> {
        Ok(())
    }
}
