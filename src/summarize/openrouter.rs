//! OpenRouter chat-completions client
//!
//! The engine is synchronous; this client owns a small tokio runtime and
//! drives its async reqwest calls to completion on it.

use std::time::Duration;

use serde_json::{json, Value};

use super::prompts::build_prompt;
use super::{validate_request, Summarizer};
use crate::error::{MnemonError, Result};
use crate::types::{SummaryKind, SummaryLength};

/// Default summarization model
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct";

/// Per-call timeout; summarization is the slowest dependency on the write path
const REQUEST_TIMEOUT_SECS: u64 = 45;

pub struct OpenRouterSummarizer {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenRouterSummarizer {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_model(endpoint, api_key, DEFAULT_MODEL)
    }

    pub fn with_model(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                MnemonError::DependencyUnavailable(format!("failed to build HTTP client: {}", e))
            })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| MnemonError::Internal(format!("failed to build runtime: {}", e)))?;

        Ok(Self {
            client,
            runtime,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                MnemonError::DependencyUnavailable(format!("summarization API unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MnemonError::DependencyUnavailable(format!(
                "summarization API error {}: {}",
                status, text
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            MnemonError::DependencyUnavailable(format!("invalid summarization response: {}", e))
        })?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MnemonError::DependencyUnavailable(
                    "summarization response had no content".to_string(),
                )
            })?;

        Ok(content)
    }
}

impl Summarizer for OpenRouterSummarizer {
    fn summarize(
        &self,
        text: &str,
        kind: SummaryKind,
        length: SummaryLength,
        query: Option<&str>,
    ) -> Result<String> {
        validate_request(kind, query)?;
        if text.trim().is_empty() {
            return Err(MnemonError::InvalidArgument(
                "nothing to summarize".to_string(),
            ));
        }

        let (system, user) = build_prompt(text, kind, length, query);
        tracing::debug!(model = %self.model, kind = kind.as_str(), "requesting summary");
        self.runtime.block_on(self.chat(&system, &user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let client =
            OpenRouterSummarizer::new("https://api.openrouter.ai/v1/", "key").unwrap();
        assert_eq!(client.endpoint, "https://api.openrouter.ai/v1");
    }

    #[test]
    fn test_query_focused_without_query_fails_before_network() {
        let client = OpenRouterSummarizer::new("http://127.0.0.1:1", "key").unwrap();
        let err = client
            .summarize(
                "text",
                SummaryKind::QueryFocused,
                SummaryLength::Short,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, MnemonError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_text_rejected_before_network() {
        let client = OpenRouterSummarizer::new("http://127.0.0.1:1", "key").unwrap();
        let err = client
            .summarize("   ", SummaryKind::Abstractive, SummaryLength::Short, None)
            .unwrap_err();
        assert!(matches!(err, MnemonError::InvalidArgument(_)));
    }
}
