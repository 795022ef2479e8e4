//! OpenAI-compatible text generator
//!
//! Streams `chat/completions` server-sent events as text tokens. Works with
//! OpenAI and any server exposing the same API (vLLM, local gateways).

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use trifivend_config::LlmConfig;
use trifivend_core::{GenerateRequest, Message, TextGenerator, TokenStream};

use crate::LlmError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Streaming chat-completion generator
pub struct OpenAIGenerator {
    config: LlmConfig,
    client: Client,
}

impl OpenAIGenerator {
    /// Create new generator
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;

        if !config.is_configured() {
            tracing::warn!(endpoint = %config.endpoint, "No API key for remote LLM endpoint");
        }

        Ok(Self { config, client })
    }

    /// Full API URL for chat completions
    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_headers(&self) -> reqwest::header::HeaderMap {
        use reqwest::header::HeaderValue;

        let mut headers = reqwest::header::HeaderMap::new();
        if !self.config.api_key.is_empty() {
            let auth_value = format!("Bearer {}", self.config.api_key);
            if let Ok(val) = HeaderValue::from_str(&auth_value) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers
    }

    fn build_request(&self, turns: &[Message], is_first_turn: bool) -> OpenAIChatRequest {
        let mut request =
            GenerateRequest::from_messages(turns.to_vec()).with_temperature(self.config.temperature);
        request.stream = true;
        let max_tokens = if is_first_turn {
            Some(self.config.first_turn_max_tokens)
        } else {
            self.config.max_tokens
        };
        if let Some(max_tokens) = max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        OpenAIChatRequest {
            model: self.config.model.clone(),
            request,
        }
    }

    /// Open the event stream, retrying transient failures
    ///
    /// Retries only cover connection setup; once the response is streaming
    /// no request is ever repeated.
    async fn connect(&self, request: &OpenAIChatRequest) -> Result<reqwest::Response, LlmError> {
        let mut last_error = None;
        let mut backoff = INITIAL_BACKOFF;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(
                    ?backoff,
                    attempt,
                    max_retries = self.config.max_retries,
                    "LLM request failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network("Max retries exceeded".to_string())))
    }

    async fn execute_request(&self, request: &OpenAIChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.chat_url())
            .headers(self.build_headers())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        // 5xx and throttling are retryable, other 4xx are not
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Err(LlmError::Network(format!("HTTP {}: {}", status, error_text)))
        } else {
            Err(LlmError::Api(format!("HTTP {}: {}", status, error_text)))
        }
    }
}

impl TextGenerator for OpenAIGenerator {
    fn generate<'a>(&'a self, turns: &'a [Message], is_first_turn: bool) -> TokenStream<'a> {
        Box::pin(async_stream::stream! {
            let request = self.build_request(turns, is_first_turn);
            let response = match self.connect(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, model = %self.config.model, "LLM request failed");
                    yield Err(trifivend_core::Error::from(e));
                    return;
                }
            };

            let mut stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(trifivend_core::Error::from(LlmError::from(e)));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                // Process complete SSE lines
                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(line.trim()) {
                        Ok(SseLine::Skip) => {}
                        Ok(SseLine::Done) => return,
                        Ok(SseLine::Token(token)) => yield Ok(token),
                        Err(e) => {
                            yield Err(trifivend_core::Error::from(e));
                            return;
                        }
                    }
                }
            }

            // Trailing line without a newline
            if let Ok(SseLine::Token(token)) = parse_sse_line(String::from_utf8_lossy(&buffer).trim()) {
                yield Ok(token);
            }
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Done,
    Token(String),
}

fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    if line.is_empty() {
        return Ok(SseLine::Skip);
    }
    let Some(json_str) = line.strip_prefix("data:") else {
        // comments, event names, retry hints
        return Ok(SseLine::Skip);
    };
    let json_str = json_str.trim_start();
    if json_str == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: OpenAIStreamChunk = serde_json::from_str(json_str)
        .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty());

    Ok(content.map(SseLine::Token).unwrap_or(SseLine::Skip))
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    #[serde(flatten)]
    request: GenerateRequest,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    delta: Option<OpenAIDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> OpenAIGenerator {
        let config = LlmConfig {
            endpoint: "http://localhost:8000/v1/".to_string(),
            api_key: "sk-test".to_string(),
            max_tokens: Some(200),
            ..LlmConfig::default()
        };
        OpenAIGenerator::new(config).unwrap()
    }

    #[test]
    fn test_chat_url() {
        assert_eq!(generator().chat_url(), "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_first_turn_budget() {
        let generator = generator();
        let turns = vec![Message::system("Be brief."), Message::user("Hello?")];

        let first = serde_json::to_value(generator.build_request(&turns, true)).unwrap();
        assert_eq!(first["max_tokens"], 90);
        assert_eq!(first["stream"], true);
        assert_eq!(first["model"], "gpt-4o-mini");
        assert_eq!(first["messages"][1]["role"], "user");

        let later = serde_json::to_value(generator.build_request(&turns, false)).unwrap();
        assert_eq!(later["max_tokens"], 200);
    }

    #[test]
    fn test_no_max_tokens_after_first_turn_by_default() {
        let config = LlmConfig {
            endpoint: "http://localhost:8000/v1".to_string(),
            ..LlmConfig::default()
        };
        let generator = OpenAIGenerator::new(config).unwrap();
        let request = serde_json::to_value(generator.build_request(&[], false)).unwrap();
        assert!(request.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            SseLine::Token("Hi".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#).unwrap(), SseLine::Skip);
    }

    #[test]
    fn test_malformed_event_is_an_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_generation_error() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            max_retries: 0,
            ..LlmConfig::default()
        };
        let generator = OpenAIGenerator::new(config).unwrap();
        let turns = vec![Message::user("hello")];

        let items: Vec<_> = generator.generate(&turns, true).collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
    }
}
