//! Per-call status events
//!
//! Pushed to observers (dashboards, SSE clients) as a call progresses.

use serde::{Deserialize, Serialize};

/// Structured status event for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// Call registered with the agent
    CallStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        script_id: Option<String>,
    },
    /// A caller utterance started a new turn
    TurnStarted { turn: u32 },
    /// Filler audio was pushed ahead of the real reply
    BackchannelEmitted,
    /// The full reply text for the turn
    ReplyReady { text: String },
    /// Unprompted follow-up spoken after caller silence
    ContinuationEmitted { text: String },
    /// Telephony status update
    CallStatus { status: String },
    /// Non-fatal failure during a turn
    Error { detail: String },
    CallEnded,
}

impl CallEvent {
    /// Event name used for SSE `event:` fields and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::CallStarted { .. } => "call_started",
            CallEvent::TurnStarted { .. } => "turn_started",
            CallEvent::BackchannelEmitted => "backchannel_emitted",
            CallEvent::ReplyReady { .. } => "reply_ready",
            CallEvent::ContinuationEmitted { .. } => "continuation_emitted",
            CallEvent::CallStatus { .. } => "call_status",
            CallEvent::Error { .. } => "error",
            CallEvent::CallEnded => "call_ended",
        }
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallEvent::CallEnded)
    }
}
