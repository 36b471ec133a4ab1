//! Summaries from a local text-generation service.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;
use crate::util::{truncate_chars, UserAgentPool};
use crate::SENTINEL;

/// Instruction placed before the article text.
pub const PROMPT_PREFIX: &str = "summarize the following article into a quick readable form factor with just the summary posted and nothing else: ";

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Produces a short summary of article text.
///
/// `None` means no summary could be produced; callers store the sentinel.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Option<String>;
}

// ============================================================================
// Output cleanup
// ============================================================================

struct Cleaners {
    blocks: Regex,
    stray_tags: Regex,
    whitespace: Regex,
}

fn cleaners() -> Option<&'static Cleaners> {
    static CLEANERS: OnceLock<Option<Cleaners>> = OnceLock::new();
    CLEANERS
        .get_or_init(|| {
            Some(Cleaners {
                blocks: Regex::new(
                    r"(?is)<think\s*>.*?</think\s*>|<thinking\s*>.*?</thinking\s*>|<reason\s*>.*?</reason\s*>|<analysis\s*>.*?</analysis\s*>",
                )
                .ok()?,
                stray_tags: Regex::new(r"(?i)</?(?:think|thinking|reason|analysis)\s*>").ok()?,
                whitespace: Regex::new(r"\s+").ok()?,
            })
        })
        .as_ref()
}

/// Strips reasoning blocks (`<think>`, `<thinking>`, `<reason>`,
/// `<analysis>`) and any unpaired tags of those kinds from model output,
/// then collapses whitespace runs to single spaces.
///
/// An empty result means the model produced nothing but reasoning.
pub fn clean_summary(text: &str) -> String {
    let Some(c) = cleaners() else {
        return text.trim().to_string();
    };
    let text = c.blocks.replace_all(text, "");
    let text = c.stray_tags.replace_all(&text, "");
    c.whitespace.replace_all(&text, " ").trim().to_string()
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

/// Client for an Ollama-style `/api/generate` endpoint.
///
/// One non-streaming request per article, no retry. The timeout is a hard
/// ceiling sized for slow local inference.
#[derive(Clone)]
pub struct OllamaSummarizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    timeout: Duration,
    max_input_chars: usize,
    user_agents: UserAgentPool,
}

impl OllamaSummarizer {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            endpoint: config.summarizer.endpoint.clone(),
            model: config.summarizer.model.clone(),
            timeout: config.summarizer.timeout(),
            max_input_chars: config.summarizer.max_input_chars,
            user_agents: UserAgentPool::new(&config.user_agents),
        }
    }

    fn prompt(&self, text: &str) -> String {
        format!("{}{}", PROMPT_PREFIX, truncate_chars(text, self.max_input_chars))
    }

    /// Issues the generation request.
    ///
    /// The `response` field passes through [`clean_summary`]. A success
    /// response without that field, or with nothing left after cleaning,
    /// yields the sentinel.
    ///
    /// # Errors
    ///
    /// - [`SummarizeError::Network`] - Transport failure or undecodable body
    /// - [`SummarizeError::HttpStatus`] - Non-2xx response
    /// - [`SummarizeError::Timeout`] - No complete response within the ceiling
    pub async fn generate(&self, text: &str) -> Result<String, SummarizeError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: self.prompt(text),
            stream: false,
        };

        let call = async {
            let response = self
                .client
                .post(&self.endpoint)
                .header(reqwest::header::USER_AGENT, self.user_agents.pick())
                .json(&request)
                .send()
                .await
                .map_err(SummarizeError::Network)?;

            if !response.status().is_success() {
                return Err(SummarizeError::HttpStatus(response.status().as_u16()));
            }

            let body: GenerateResponse = response.json().await.map_err(SummarizeError::Network)?;
            let summary = body
                .response
                .map(|raw| clean_summary(&raw))
                .filter(|cleaned| !cleaned.is_empty())
                .unwrap_or_else(|| SENTINEL.to_string());
            Ok(summary)
        };

        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SummarizeError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, text: &str) -> Option<String> {
        match self.generate(text).await {
            Ok(summary) => {
                tracing::debug!(model = %self.model, chars = summary.chars().count(), "Summary generated");
                Some(summary)
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, model = %self.model, error = %e, "Summarization failed");
                None
            }
        }
    }
}
