//! HTML to article text: the selector cascade, the content validator and the
//! link rewrite applied before extraction.

use scraper::{ElementRef, Html, Selector};
use std::fmt;
use thiserror::Error;

use super::rules::SiteRule;
use crate::SENTINEL;

/// Minimum accepted article length, in characters.
pub const MIN_CONTENT_CHARS: usize = 100;

/// Substrings that mark an error page served with a success status.
pub const ERROR_MARKERS: [&str; 3] = ["404", "Access Denied", "Forbidden"];

/// Generic containers, tried in order after the site rule.
const GENERIC_CONTAINERS: [(Strategy, &str); 4] = [
    (Strategy::Article, "article"),
    (
        Strategy::ContentClass,
        "div.articleBody, div.post-content, div.article-content, div.entry-content, div.content-body, div.field-item.even",
    ),
    (Strategy::ItemProp, r#"div[itemprop="articleBody"]"#),
    (Strategy::RoleMain, r#"div[role="main"]"#),
];

const TEXT_BLOCKS: &str = "p, h2, h3";

/// Which stage of the cascade produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SiteContainer,
    Article,
    ContentClass,
    ItemProp,
    RoleMain,
    /// Every `<p>` on the page
    Paragraphs,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::SiteContainer => "site container",
            Strategy::Article => "article",
            Strategy::ContentClass => "content class",
            Strategy::ItemProp => "itemprop articleBody",
            Strategy::RoleMain => "role main",
            Strategy::Paragraphs => "all paragraphs",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text recovered from a page, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub strategy: Strategy,
}

/// Text of an element with inline markup flattened.
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Non-empty `p`/`h2`/`h3` texts under `container`, joined by spaces.
fn block_text(container: ElementRef<'_>, blocks: &Selector) -> String {
    container
        .select(blocks)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_container_text(document: &Html, container: &str, blocks: &Selector) -> Option<String> {
    let selector = match Selector::parse(container) {
        Ok(selector) => selector,
        Err(e) => {
            tracing::warn!(selector = %container, error = %e, "Skipping invalid container selector");
            return None;
        }
    };
    let element = document.select(&selector).next()?;
    let text = block_text(element, blocks);
    (!text.is_empty()).then_some(text)
}

/// Recovers article text from page markup.
///
/// Stages, first non-empty result wins:
/// 1. the site rule's container, when a rule is given
/// 2. the first `<article>`, then the first known content-class `<div>`, then
///    `div[itemprop=articleBody]`, then `div[role=main]`
/// 3. every `<p>` on the page
///
/// Within a container only `p`, `h2` and `h3` descendants are read, each
/// trimmed, empties dropped, joined by single spaces. Only the first match of
/// each selector is considered. Returns `None` when even the paragraph
/// fallback is empty.
pub fn extract_text(html: &str, rule: Option<&SiteRule>) -> Option<ExtractedText> {
    let document = Html::parse_document(html);
    let (Ok(blocks), Ok(paragraphs)) = (Selector::parse(TEXT_BLOCKS), Selector::parse("p")) else {
        return None;
    };

    if let Some(rule) = rule {
        if let Some(text) = first_container_text(&document, &rule.container, &blocks) {
            return Some(ExtractedText {
                text,
                strategy: Strategy::SiteContainer,
            });
        }
        tracing::debug!(
            host = %rule.host_pattern,
            container = %rule.container,
            "Site container missing or empty, trying generic selectors"
        );
    }

    for (strategy, container) in GENERIC_CONTAINERS {
        if let Some(text) = first_container_text(&document, container, &blocks) {
            return Some(ExtractedText { text, strategy });
        }
    }

    tracing::debug!("No content container found, falling back to all paragraphs");
    let text = document
        .select(&paragraphs)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    (!text.is_empty()).then_some(ExtractedText {
        text,
        strategy: Strategy::Paragraphs,
    })
}

// ============================================================================
// Validation
// ============================================================================

/// Why extracted text was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("content is empty")]
    Empty,
    #[error("content too short ({chars} chars, minimum 100)")]
    TooShort { chars: usize },
    #[error("content looks like an error page (contains \"{0}\")")]
    ErrorPage(&'static str),
}

/// Rejects text that is empty or the sentinel, shorter than
/// [`MIN_CONTENT_CHARS`] characters, or contains an [`ERROR_MARKERS`] entry.
///
/// The marker check is a plain substring test, so an article that merely
/// mentions "404" is rejected too.
pub fn validate_content(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() || text == SENTINEL {
        return Err(ValidationError::Empty);
    }
    let chars = text.chars().count();
    if chars < MIN_CONTENT_CHARS {
        return Err(ValidationError::TooShort { chars });
    }
    if let Some(marker) = ERROR_MARKERS.into_iter().find(|m| text.contains(*m)) {
        return Err(ValidationError::ErrorPage(marker));
    }
    Ok(())
}

// ============================================================================
// Link rewrite
// ============================================================================

/// Re-bases links containing `marker` onto `origin`.
///
/// Some feeds publish site-relative links (`/cybersecurity-blog/...`); those
/// get `origin` prefixed. Absolute links carrying the marker keep their path
/// and query but move to `origin`. Links without the marker are returned
/// unchanged.
pub fn rewrite_link(link: &str, marker: &str, origin: &str) -> String {
    if marker.is_empty() || !link.contains(marker) {
        return link.to_string();
    }
    let origin = origin.trim_end_matches('/');
    match url::Url::parse(link) {
        Ok(parsed) => {
            let mut rebased = format!("{}{}", origin, parsed.path());
            if let Some(query) = parsed.query() {
                rebased.push('?');
                rebased.push_str(query);
            }
            rebased
        }
        Err(_) if link.starts_with('/') => format!("{}{}", origin, link),
        Err(_) => format!("{}/{}", origin, link),
    }
}
