//! Security-news harvester.
//!
//! Reads a static list of RSS feeds, skips items already stored, recovers the
//! article text behind each new link, asks a local generation service for a
//! short summary and appends the result to SQLite.
//!
//! - [`feed`]: feed list, download and RSS item parsing
//! - [`storage`]: fingerprints and the append-only article tables
//! - [`content`]: page rendering, selector cascade and validation
//! - [`summarize`]: generation client
//! - [`pipeline`]: the sequential run tying it together

pub mod config;
pub mod content;
pub mod feed;
pub mod pipeline;
pub mod storage;
pub mod summarize;
pub mod util;

/// Stored in place of any value that could not be obtained.
pub const SENTINEL: &str = "N/A";
