use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{ArticleTable, DatabaseError};
use crate::config::ADVISORY_FEED_URL;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    /// Feed whose records are routed to the `nist` table
    pub(crate) advisory_feed_url: String,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `path` may be `:memory:` for a throwaway store.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another process holds the database
    /// lock past the busy timeout, `DatabaseError::Migration` if the schema
    /// could not be created, and `DatabaseError::Other` otherwise.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release
        // before returning SQLITE_BUSY. Every pooled connection inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // Runs are sequential with a single writer. One connection also keeps
        // `:memory:` databases free of shared-cache table locks.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self {
            pool,
            advisory_feed_url: ADVISORY_FEED_URL.to_string(),
        };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Other(e) => DatabaseError::Migration(e.to_string()),
            locked => locked,
        })?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Overrides the feed URL routed to the `nist` table.
    pub fn with_advisory_feed(mut self, url: impl Into<String>) -> Self {
        self.advisory_feed_url = url.into();
        self
    }

    /// Table a record from `feed_url` belongs to.
    pub fn table_for(&self, feed_url: &str) -> ArticleTable {
        ArticleTable::route(feed_url, &self.advisory_feed_url)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// Both tables share one shape. `hash` is indexed for the dedup lookup but
    /// is deliberately not UNIQUE: uniqueness comes from the check-then-insert
    /// sequence in [`Database::insert_article`], which is only safe with a
    /// single writer process.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for table in ArticleTable::ALL {
            let name = table.name();
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    hash TEXT NOT NULL,
                    site_url TEXT NOT NULL,
                    title TEXT NOT NULL,
                    link TEXT NOT NULL,
                    published TEXT NOT NULL,
                    tldr TEXT NOT NULL
                )
            "#
            ))
            .execute(&mut *tx)
            .await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{name}_hash ON {name}(hash)"
            ))
            .execute(&mut *tx)
            .await?;
        }

        // Commit all migrations atomically
        tx.commit().await?;

        Ok(())
    }
}
