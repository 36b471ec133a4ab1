use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::extract::{extract_text, validate_content, Strategy, ValidationError};
use super::failure_log::FailureLog;
use super::render::{PageRenderer, RenderError};
use super::rules::{RenderMode, SiteRules, GENERIC_READY_SELECTOR};
use crate::config::Config;
use crate::util::preview;

/// Why a URL produced no usable article text.
///
/// The orchestrator collapses every variant into the same sentinel summary;
/// the variants only feed statistics and the failure log.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    /// The page could not be loaded at all
    #[error("Error loading URL: {0}")]
    Navigation(#[source] RenderError),
    /// The page loaded but the ready selector never appeared
    #[error("Timeout waiting for content `{selector}` after {waited:?}")]
    WaitTimeout { selector: String, waited: Duration },
    /// No container and no paragraph yielded text
    #[error("No content")]
    NoContent,
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// Browser or markup fault unrelated to the page's availability
    #[error("Render error: {0}")]
    Render(#[source] RenderError),
}

impl ExtractionFailure {
    /// True when a page was read but its text was unusable.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExtractionFailure::Validation(_) | ExtractionFailure::NoContent
        )
    }
}

impl From<RenderError> for ExtractionFailure {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::WaitTimeout { selector, waited } => {
                ExtractionFailure::WaitTimeout { selector, waited }
            }
            e if e.is_navigation() => ExtractionFailure::Navigation(e),
            e => ExtractionFailure::Render(e),
        }
    }
}

/// Validated article text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub strategy: Strategy,
}

/// Page to validated text: picks the site rule, renders, runs the selector
/// cascade and validates. Failures are appended to the [`FailureLog`].
pub struct ContentExtractor {
    rules: SiteRules,
    fetch: Arc<dyn PageRenderer>,
    browser: Option<Arc<dyn PageRenderer>>,
    wait: Duration,
    failure_log: FailureLog,
}

impl ContentExtractor {
    /// Extractor that renders every page with `fetch`. Add a browser with
    /// [`ContentExtractor::with_browser`].
    pub fn new(fetch: Arc<dyn PageRenderer>, failure_log: FailureLog, config: &Config) -> Self {
        Self {
            rules: SiteRules::default(),
            fetch,
            browser: None,
            wait: config.render.wait(),
            failure_log,
        }
    }

    /// Renderer for sites whose rule asks for a browser, and for unknown sites.
    pub fn with_browser(mut self, browser: Arc<dyn PageRenderer>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_rules(mut self, rules: SiteRules) -> Self {
        self.rules = rules;
        self
    }

    fn renderer_for(&self, mode: RenderMode) -> &dyn PageRenderer {
        match (mode, &self.browser) {
            (RenderMode::Browser, Some(browser)) => browser.as_ref(),
            _ => self.fetch.as_ref(),
        }
    }

    pub async fn extract(&self, url: &str) -> Result<Extraction, ExtractionFailure> {
        tracing::debug!(url = %url, "Attempting extraction");
        let result = self.try_extract(url).await;
        match &result {
            Ok(extraction) => {
                tracing::info!(
                    url = %url,
                    chars = extraction.text.chars().count(),
                    strategy = %extraction.strategy,
                    "Content extracted"
                );
            }
            Err(failure) => {
                tracing::warn!(url = %url, reason = %failure, "Content extraction failed");
                self.failure_log.record(url, &failure.to_string()).await;
            }
        }
        result
    }

    async fn try_extract(&self, url: &str) -> Result<Extraction, ExtractionFailure> {
        let rule = self.rules.lookup(url);
        let (ready, mode) = match rule {
            Some(rule) => (rule.ready.as_str(), rule.mode),
            None => (GENERIC_READY_SELECTOR, RenderMode::Browser),
        };
        tracing::debug!(url = %url, ready = %ready, mode = ?mode, known_site = rule.is_some(), "Rendering page");

        let html = self
            .renderer_for(mode)
            .render(url, ready, self.wait)
            .await?;
        tracing::debug!(url = %url, bytes = html.len(), "Got page source");

        let extracted = extract_text(&html, rule).ok_or(ExtractionFailure::NoContent)?;
        tracing::debug!(
            strategy = %extracted.strategy,
            preview = %preview(&extracted.text, 200),
            "Extracted text"
        );

        validate_content(&extracted.text)?;
        Ok(Extraction {
            text: extracted.text,
            strategy: extracted.strategy,
        })
    }
}
