//! Fragment buffer for streamed replies
//!
//! Accumulates generator tokens and releases clause/sentence sized
//! fragments for speech synthesis:
//! - always at `max_chars`
//! - at `min_chars` once a sentence delimiter is in the buffer
//!
//! Lengths are counted in characters, not bytes.

use futures::{Stream, StreamExt};
use std::pin::Pin;
use trifivend_config::{constants::fragments, OrchestrationConfig};
use trifivend_core::Result;

/// Lazy, finite stream of trimmed, non-empty fragments
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Fragment buffer configuration
#[derive(Debug, Clone)]
pub struct FragmentConfig {
    /// Flush at a delimiter once the buffer holds this many characters
    pub min_chars: usize,
    /// Flush unconditionally at this many characters
    pub max_chars: usize,
    /// Sentence-terminating characters
    pub delimiters: Vec<char>,
}

impl Default for FragmentConfig {
    fn default() -> Self {
        Self {
            min_chars: fragments::MIN_FLUSH_CHARS,
            max_chars: fragments::MAX_FLUSH_CHARS,
            delimiters: fragments::SENTENCE_DELIMITERS.to_vec(),
        }
    }
}

impl FragmentConfig {
    pub fn new(min_chars: usize, max_chars: usize) -> Self {
        Self {
            min_chars,
            max_chars,
            ..Default::default()
        }
    }
}

impl From<&OrchestrationConfig> for FragmentConfig {
    fn from(config: &OrchestrationConfig) -> Self {
        Self::new(config.min_flush_chars, config.max_flush_chars)
    }
}

/// Synchronous token accumulator
#[derive(Debug)]
pub struct FragmentBuffer {
    config: FragmentConfig,
    buffer: String,
    /// Character count of `buffer`
    chars: usize,
}

impl FragmentBuffer {
    pub fn new(config: FragmentConfig) -> Self {
        Self {
            config,
            buffer: String::new(),
            chars: 0,
        }
    }

    /// Append a token, returning a fragment if a release condition is met
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);
        self.chars += token.chars().count();

        if self.should_flush() {
            self.take()
        } else {
            None
        }
    }

    /// Release whatever remains at end of stream
    pub fn finish(&mut self) -> Option<String> {
        self.take()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn should_flush(&self) -> bool {
        if self.chars >= self.config.max_chars {
            return true;
        }
        self.chars >= self.config.min_chars
            && self.buffer.contains(|c: char| self.config.delimiters.contains(&c))
    }

    /// Reset the buffer; whitespace-only content is dropped
    fn take(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.buffer);
        self.chars = 0;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Turn a token stream into a fragment stream
///
/// A generator error is passed through and ends the stream; text still
/// buffered at that point is discarded.
pub fn flush_fragments<'a, S>(tokens: S, config: FragmentConfig) -> FragmentStream<'a>
where
    S: Stream<Item = Result<String>> + Send + 'a,
{
    Box::pin(async_stream::stream! {
        futures::pin_mut!(tokens);
        let mut buffer = FragmentBuffer::new(config);

        while let Some(token) = tokens.next().await {
            match token {
                Ok(token) => {
                    if let Some(fragment) = buffer.push(&token) {
                        yield Ok(fragment);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }

        if let Some(tail) = buffer.finish() {
            yield Ok(tail);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use trifivend_core::Error;

    const GREETING: [&str; 8] = ["Hi", ", ", "there", ". ", "How", " are", " you", "?"];

    fn collect(tokens: &[&str], config: FragmentConfig) -> Vec<String> {
        let mut buffer = FragmentBuffer::new(config);
        let mut out: Vec<String> = tokens.iter().filter_map(|t| buffer.push(t)).collect();
        out.extend(buffer.finish());
        out
    }

    #[test]
    fn test_short_reply_is_one_fragment() {
        let fragments = collect(&GREETING, FragmentConfig::default());
        assert_eq!(fragments, vec!["Hi, there. How are you?"]);
    }

    #[test]
    fn test_splits_at_delimiter_once_min_reached() {
        let fragments = collect(&GREETING, FragmentConfig::new(6, 80));
        assert_eq!(fragments, vec!["Hi, there.", "How are you?"]);
    }

    #[test]
    fn test_deterministic() {
        let config = FragmentConfig::new(6, 80);
        assert_eq!(collect(&GREETING, config.clone()), collect(&GREETING, config));
    }

    #[test]
    fn test_max_length_forces_flush_without_punctuation() {
        let tokens: Vec<String> = (0..30).map(|i| format!("{} ", i)).collect();
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let fragments = collect(&refs, FragmentConfig::new(60, 20));

        assert!(fragments.len() > 1);
        for fragment in &fragments {
            assert!(fragment.chars().count() <= 21, "fragment too long: {:?}", fragment);
        }
        assert_eq!(fragments.join(" "), tokens.concat().trim());
    }

    #[test]
    fn test_delimiter_below_min_does_not_flush() {
        let mut buffer = FragmentBuffer::new(FragmentConfig::new(60, 80));
        assert_eq!(buffer.push("Yes."), None);
        assert!(!buffer.is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("Yes."));
    }

    #[test]
    fn test_whitespace_flush_is_suppressed() {
        let mut buffer = FragmentBuffer::new(FragmentConfig::new(1, 3));
        assert_eq!(buffer.push("   "), None);
        assert!(buffer.is_empty());
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 5 characters, 10 bytes
        let mut buffer = FragmentBuffer::new(FragmentConfig::new(60, 6));
        assert_eq!(buffer.push("ééééé"), None);
        assert_eq!(buffer.push("é").as_deref(), Some("éééééé"));
    }

    #[tokio::test]
    async fn test_flush_fragments_stream() {
        let tokens = futures::stream::iter(GREETING.iter().map(|t| Ok(t.to_string())));
        let fragments: Vec<_> = flush_fragments(tokens, FragmentConfig::new(6, 80))
            .collect::<Vec<_>>()
            .await;

        let fragments: Vec<String> = fragments.into_iter().map(|f| f.unwrap()).collect();
        assert_eq!(fragments, vec!["Hi, there.", "How are you?"]);
    }

    #[tokio::test]
    async fn test_flush_fragments_stops_on_error() {
        let tokens = futures::stream::iter(vec![
            Ok("Hello there. This is long enough to flush!".to_string()),
            Err(Error::Generation("upstream closed".to_string())),
            Ok("never seen".to_string()),
        ]);
        let items: Vec<_> = flush_fragments(tokens, FragmentConfig::new(10, 80))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].as_deref().unwrap(),
            "Hello there. This is long enough to flush!"
        );
        assert!(matches!(items[1], Err(Error::Generation(_))));
    }
}
