//! Durable article storage: fingerprinting, dedup lookups and append-only inserts.
//!
//! Records are split across two identically shaped tables, `nist` for the
//! advisory feed and `all_articles` for everything else. A record is keyed by
//! its [`Fingerprint`] and is never updated or deleted by the pipeline.

mod articles;
mod fingerprint;
mod schema;
mod types;

pub use fingerprint::Fingerprint;
pub use schema::Database;
pub use types::{ArticleTable, DatabaseError, InsertOutcome, NewArticle, StoredArticle};
