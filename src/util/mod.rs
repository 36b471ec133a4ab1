//! Utility functions shared by the fetch, extraction and summarization stages.
//!
//! - **URL validation**: scheme and host checks before any outbound request
//! - **Text processing**: character-safe truncation and log previews
//! - **User agents**: random selection from the configured rotation pool
//! - **HTTP client**: shared client with a bounded redirect policy
//!
//! # Examples
//!
//! ```
//! use infobroker::util::{truncate_chars, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(truncate_chars("Hello World", 5), "Hello...");
//! ```

mod http;
mod text;
mod url_validator;
mod user_agent;

pub use http::build_http_client;
pub use text::{preview, truncate_chars};
pub use url_validator::{validate_url, UrlValidationError};
pub use user_agent::UserAgentPool;
