//! Centralized defaults for the call agent
//!
//! Single source of truth for values that appear both in serde defaults and
//! in adapter constructors.

/// External service endpoints
pub mod endpoints {
    /// OpenAI-compatible chat completions base URL
    pub const LLM_DEFAULT: &str = "https://api.openai.com/v1";

    /// ElevenLabs API base URL
    pub const TTS_DEFAULT: &str = "https://api.elevenlabs.io/v1";
}

/// Reply shaping for streamed speech
pub mod fragments {
    /// Flush once a sentence delimiter is present and the buffer reaches this length
    pub const MIN_FLUSH_CHARS: usize = 60;

    /// Always flush at this length
    pub const MAX_FLUSH_CHARS: usize = 80;

    /// Characters that end a speakable clause
    pub const SENTENCE_DELIMITERS: [char; 4] = ['.', '?', '!', '\n'];
}

/// Turn timing
pub mod timing {
    /// Delay before filler audio is spoken (ms)
    pub const BACKCHANNEL_DELAY_MS: u64 = 300;

    /// Silence window after the opening reply before an unprompted follow-up (s)
    pub const CONTINUATION_WINDOW_SECS: f64 = 2.0;
}

/// Language model defaults
pub mod llm {
    pub const MODEL: &str = "gpt-4o-mini";
    pub const TEMPERATURE: f32 = 0.6;
    /// Reply budget for the opening turn
    pub const FIRST_TURN_MAX_TOKENS: u32 = 90;
    /// System prompts are cut to this many words
    pub const SYSTEM_PROMPT_WORD_LIMIT: usize = 300;
}

/// Speech synthesis defaults
pub mod tts {
    pub const VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
    pub const MODEL_ID: &str = "eleven_monolingual_v1";
    pub const OUTPUT_FORMAT: &str = "mp3_44100_32";
    /// Longest text sent in one synthesis request
    pub const MAX_CHARS: usize = 280;
}

/// Telephony call statuses after which the call is torn down
pub const TERMINAL_CALL_STATUSES: [&str; 5] = ["completed", "failed", "busy", "no-answer", "canceled"];
