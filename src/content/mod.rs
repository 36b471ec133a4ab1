//! Article text recovery for feed links.
//!
//! [`ContentExtractor`] ties the pieces together: a [`SiteRules`] lookup picks
//! the ready selector and render mode, a [`PageRenderer`] produces markup,
//! [`extract_text`] runs the selector cascade and [`validate_content`] rejects
//! error pages and stubs.

mod extract;
mod extractor;
mod failure_log;
mod render;
mod rules;

pub use extract::{
    extract_text, rewrite_link, validate_content, ExtractedText, Strategy, ValidationError,
    ERROR_MARKERS, MIN_CONTENT_CHARS,
};
pub use extractor::{ContentExtractor, Extraction, ExtractionFailure};
pub use failure_log::FailureLog;
pub use render::{HttpRenderer, PageRenderer, RenderError, WebDriverRenderer};
pub use rules::{RenderMode, SiteRule, SiteRules, GENERIC_READY_SELECTOR};
