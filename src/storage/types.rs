use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::fingerprint::Fingerprint;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock beyond the busy timeout
    #[error("Database is locked by another process")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Table Routing
// ============================================================================

/// Destination table for an article record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleTable {
    /// Reserved for the NVD advisory feed
    Nist,
    /// Every other feed
    AllArticles,
}

impl ArticleTable {
    pub const ALL: [ArticleTable; 2] = [ArticleTable::Nist, ArticleTable::AllArticles];

    /// Routes by exact feed URL match against the advisory feed.
    pub fn route(feed_url: &str, advisory_feed_url: &str) -> Self {
        if feed_url == advisory_feed_url {
            ArticleTable::Nist
        } else {
            ArticleTable::AllArticles
        }
    }

    /// SQL identifier. Static, so safe to splice into query text.
    pub fn name(self) -> &'static str {
        match self {
            ArticleTable::Nist => "nist",
            ArticleTable::AllArticles => "all_articles",
        }
    }
}

impl fmt::Display for ArticleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Article ready to be persisted. The fingerprint is derived, not supplied.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub feed_url: String,
    pub title: String,
    pub link: String,
    /// Normalized date (`DD/Mon/YYYY`) or `N/A`
    pub published: String,
    pub summary: String,
}

impl NewArticle {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.feed_url, &self.title, &self.link)
    }
}

/// Result of an insert attempt. A duplicate is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

/// A persisted row, as read back for downstream publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredArticle {
    pub id: i64,
    #[sqlx(rename = "hash")]
    pub fingerprint: String,
    #[sqlx(rename = "site_url")]
    pub feed_url: String,
    pub title: String,
    pub link: String,
    pub published: String,
    #[sqlx(rename = "tldr")]
    pub summary: String,
}
