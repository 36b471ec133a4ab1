//! Feed harvesting: the static feed list, HTTP retrieval and RSS item parsing.
//!
//! - [`list`] - Loads the newline-delimited feed list before any network activity
//! - [`fetcher`] - Single-attempt HTTP download with a rotating user agent and size cap
//! - [`parser`] - Streams `<item>` elements out of an RSS document with `quick-xml`
//!
//! # Example
//!
//! ```ignore
//! use infobroker::feed::{load_feed_list, FeedFetcher};
//!
//! let feeds = load_feed_list(&config.feeds_file)?;
//! let fetcher = FeedFetcher::new(client, &config);
//! for url in &feeds {
//!     let items = fetcher.fetch_items(url).await?;
//! }
//! ```

mod fetcher;
mod list;
mod parser;

pub use fetcher::{FeedFetcher, FetchError};
pub use list::{load_feed_list, FeedListError};
pub use parser::{parse_items, published_date, FeedItem, ParseError};
