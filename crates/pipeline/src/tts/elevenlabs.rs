//! ElevenLabs streaming synthesizer
//!
//! Posts each text piece to the `/stream` endpoint and yields the response
//! body as it arrives, so playback can start before the whole clip exists.

use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use trifivend_config::TtsConfig;
use trifivend_core::{AudioStream, SpeechSynthesizer, VoiceConfig};

use super::split_text_for_tts;
use crate::PipelineError;

/// ElevenLabs text-to-speech client
pub struct ElevenLabsSynthesizer {
    endpoint: String,
    api_key: String,
    max_retries: u32,
    retry_backoff: Duration,
    max_chars: usize,
    client: Client,
}

/// Outcome of a single request attempt
enum Attempt {
    Retry(String),
    Fatal(String),
}

impl ElevenLabsSynthesizer {
    pub fn new(config: &TtsConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        if !config.is_configured() {
            tracing::warn!("ELEVENLABS api key not set; synthesis requests will fail");
        }

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff(),
            max_chars: config.max_chars,
            client,
        })
    }

    fn stream_url(&self, voice_id: &str) -> String {
        format!("{}/text-to-speech/{}/stream", self.endpoint, voice_id)
    }

    /// Open the audio stream for one piece of text
    ///
    /// Attempts up to `max_retries` times with linear backoff on transport
    /// errors, throttling and server errors.
    async fn connect(&self, text: &str, voice: &VoiceConfig) -> Result<reqwest::Response, PipelineError> {
        let attempts = self.max_retries.max(1);
        let body = SynthesisRequest::new(text, voice);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.execute_request(&body, voice).await {
                Ok(response) => return Ok(response),
                Err(Attempt::Fatal(e)) => return Err(PipelineError::Tts(e)),
                Err(Attempt::Retry(e)) => {
                    last_error = e;
                    if attempt < attempts {
                        let backoff = self.retry_backoff * attempt;
                        tracing::warn!(
                            attempt,
                            attempts,
                            ?backoff,
                            error = %last_error,
                            "TTS request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(PipelineError::Tts(format!(
            "failed after {} attempts: {}",
            attempts, last_error
        )))
    }

    async fn execute_request(
        &self,
        body: &SynthesisRequest<'_>,
        voice: &VoiceConfig,
    ) -> Result<reqwest::Response, Attempt> {
        let response = self
            .client
            .post(self.stream_url(&voice.voice_id))
            .query(&[("output_format", voice.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response.text().await.unwrap_or_default();
        let message = format!("HTTP {}: {}", status, truncate(&detail, 300));
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(Attempt::Retry(message))
        } else {
            Err(Attempt::Fatal(message))
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn synthesize<'a>(&'a self, text: &'a str, voice: &'a VoiceConfig) -> AudioStream<'a> {
        Box::pin(async_stream::stream! {
            for piece in split_text_for_tts(text, self.max_chars) {
                let response = match self.connect(&piece, voice).await {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(trifivend_core::Error::from(e));
                        return;
                    }
                };

                let mut body = response.bytes_stream();
                while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(bytes) if bytes.is_empty() => {}
                        Ok(bytes) => yield Ok(bytes.to_vec()),
                        Err(e) => {
                            yield Err(trifivend_core::Error::from(PipelineError::Tts(e.to_string())));
                            return;
                        }
                    }
                }
            }
        })
    }

    fn model_name(&self) -> &str {
        "elevenlabs"
    }
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl<'a> SynthesisRequest<'a> {
    fn new(text: &'a str, voice: &'a VoiceConfig) -> Self {
        Self {
            text,
            model_id: &voice.model_id,
            voice_settings: VoiceSettings {
                stability: voice.stability,
                similarity_boost: voice.similarity_boost,
                style: voice.style,
                use_speaker_boost: voice.use_speaker_boost,
            },
        }
    }
}
