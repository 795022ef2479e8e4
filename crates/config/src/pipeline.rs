//! Turn orchestration settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{fragments, timing};

/// Settings for the per-turn pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Soft fragment length: flush at a delimiter once reached
    #[serde(default = "default_min_flush")]
    pub min_flush_chars: usize,

    /// Hard fragment length: always flush
    #[serde(default = "default_max_flush")]
    pub max_flush_chars: usize,

    #[serde(default = "default_true")]
    pub backchannel_enabled: bool,

    /// Delay before the filler phrase is spoken
    #[serde(default = "default_backchannel_delay")]
    pub backchannel_delay_ms: u64,

    #[serde(default = "default_backchannel_phrase")]
    pub backchannel_phrase: String,

    /// Silence window after the opening reply; 0 disables the follow-up
    #[serde(default = "default_continuation_window")]
    pub continuation_window_secs: f64,

    /// Buffered status events per call
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Script id that does not get a secondary instruction
    #[serde(default = "default_script_id")]
    pub default_script_id: String,
}

fn default_min_flush() -> usize {
    fragments::MIN_FLUSH_CHARS
}

fn default_max_flush() -> usize {
    fragments::MAX_FLUSH_CHARS
}

fn default_true() -> bool {
    true
}

fn default_backchannel_delay() -> u64 {
    timing::BACKCHANNEL_DELAY_MS
}

fn default_backchannel_phrase() -> String {
    "One sec…".to_string()
}

fn default_continuation_window() -> f64 {
    timing::CONTINUATION_WINDOW_SECS
}

fn default_event_capacity() -> usize {
    256
}

fn default_script_id() -> String {
    "default".to_string()
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            min_flush_chars: default_min_flush(),
            max_flush_chars: default_max_flush(),
            backchannel_enabled: true,
            backchannel_delay_ms: default_backchannel_delay(),
            backchannel_phrase: default_backchannel_phrase(),
            continuation_window_secs: default_continuation_window(),
            event_capacity: default_event_capacity(),
            default_script_id: default_script_id(),
        }
    }
}

impl OrchestrationConfig {
    pub fn backchannel_delay(&self) -> Duration {
        Duration::from_millis(self.backchannel_delay_ms)
    }

    /// Continuation window, zero when disabled or invalid
    pub fn continuation_window(&self) -> Duration {
        if self.continuation_window_secs.is_finite() && self.continuation_window_secs > 0.0 {
            Duration::from_secs_f64(self.continuation_window_secs)
        } else {
            Duration::ZERO
        }
    }
}
