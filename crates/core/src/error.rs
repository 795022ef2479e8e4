//! Error types shared by collaborator traits

use thiserror::Error;

/// Core error type
///
/// Adapter crates convert their own errors into this one so the pipeline can
/// treat every collaborator uniformly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Text generator failed or returned nothing usable
    #[error("Generation error: {0}")]
    Generation(String),

    /// Speech synthesis failed for a fragment
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Conversation recorder failed
    #[error("Recorder error: {0}")]
    Recorder(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timeout")]
    Timeout,

    /// Work was superseded by a newer turn or the call ended
    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error is a cancellation rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Generation("upstream 500".to_string());
        assert_eq!(err.to_string(), "Generation error: upstream 500");
        assert_eq!(Error::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Timeout.is_cancelled());
    }
}
