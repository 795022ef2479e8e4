//! Text generation trait

use futures::Stream;
use std::pin::Pin;

use crate::{Message, Result};

/// Lazy, finite stream of text tokens
pub type TokenStream<'a> = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'a>>;

/// Streaming text generator
///
/// Implementations:
/// - `OpenAIGenerator` - OpenAI-compatible chat completions
///
/// # Example
///
/// ```ignore
/// let turns = vec![Message::system("You are Ava."), Message::user("Who is this?")];
/// let mut tokens = generator.generate(&turns, true);
/// while let Some(token) = tokens.next().await {
///     print!("{}", token?);
/// }
/// ```
pub trait TextGenerator: Send + Sync + 'static {
    /// Stream tokens for the conversation
    ///
    /// `is_first_turn` lets backends use a shorter reply budget for the
    /// opening exchange. The stream is not restartable; upstream failures
    /// surface as `Error::Generation` items.
    fn generate<'a>(&'a self, turns: &'a [Message], is_first_turn: bool) -> TokenStream<'a>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}
