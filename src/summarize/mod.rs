//! Summarization capability
//!
//! An abstract `Summarizer` the engine consumes; the shipped implementation
//! talks to an OpenAI-compatible chat-completions endpoint (OpenRouter).
//! Summarization failures degrade gracefully upstream - the engine stores
//! the memory either way.

mod openrouter;
mod prompts;

pub use openrouter::OpenRouterSummarizer;
pub use prompts::build_prompt;

use crate::error::{MnemonError, Result};
use crate::types::{SummaryKind, SummaryLength};

/// Trait for summary generators
pub trait Summarizer: Send + Sync {
    /// Produce a summary of `text`. `query` is only consulted for
    /// query-focused summaries.
    fn summarize(
        &self,
        text: &str,
        kind: SummaryKind,
        length: SummaryLength,
        query: Option<&str>,
    ) -> Result<String>;
}

/// Shared boundary validation for summarize requests
pub fn validate_request(kind: SummaryKind, query: Option<&str>) -> Result<()> {
    if kind == SummaryKind::QueryFocused {
        match query {
            Some(q) if !q.trim().is_empty() => Ok(()),
            _ => Err(MnemonError::InvalidArgument(
                "query_focused summaries require a non-empty query".to_string(),
            )),
        }
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_focused_requires_query() {
        assert!(validate_request(SummaryKind::QueryFocused, None).is_err());
        assert!(validate_request(SummaryKind::QueryFocused, Some("  ")).is_err());
        assert!(validate_request(SummaryKind::QueryFocused, Some("rust")).is_ok());
    }

    #[test]
    fn test_other_kinds_ignore_query() {
        assert!(validate_request(SummaryKind::Abstractive, None).is_ok());
        assert!(validate_request(SummaryKind::Extractive, None).is_ok());
    }
}
