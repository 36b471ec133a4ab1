use super::fingerprint::Fingerprint;
use super::schema::Database;
use super::types::{ArticleTable, DatabaseError, InsertOutcome, NewArticle, StoredArticle};

/// Maximum number of rows returned by a single read (OOM protection)
const MAX_ARTICLES: i64 = 2000;

impl Database {
    // ========================================================================
    // Dedup Lookups
    // ========================================================================

    /// Point lookup of a fingerprint in one table.
    pub async fn article_exists(
        &self,
        fingerprint: &Fingerprint,
        table: ArticleTable,
    ) -> Result<bool, DatabaseError> {
        let sql = format!("SELECT 1 FROM {} WHERE hash = ? LIMIT 1", table.name());
        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(row.is_some())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Inserts an article into its routed table unless its fingerprint is
    /// already present.
    ///
    /// The fingerprint is recomputed from the record, then checked and
    /// inserted inside one transaction. A present fingerprint is a no-op
    /// reported as [`InsertOutcome::Duplicate`], never an error.
    ///
    /// The check and insert are two statements: two processes writing the same
    /// file can both pass the check. Single-writer use only.
    pub async fn insert_article(
        &self,
        article: &NewArticle,
    ) -> Result<InsertOutcome, DatabaseError> {
        let table = self.table_for(&article.feed_url);
        let fingerprint = article.fingerprint();

        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let existing: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT id FROM {} WHERE hash = ? LIMIT 1",
            table.name()
        ))
        .bind(fingerprint.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if existing.is_some() {
            tracing::debug!(table = %table, hash = %fingerprint, "Article already stored");
            return Ok(InsertOutcome::Duplicate);
        }

        let result = sqlx::query(&format!(
            "INSERT INTO {} (hash, site_url, title, link, published, tldr) VALUES (?, ?, ?, ?, ?, ?)",
            table.name()
        ))
        .bind(fingerprint.as_str())
        .bind(&article.feed_url)
        .bind(&article.title)
        .bind(&article.link)
        .bind(&article.published)
        .bind(&article.summary)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        let id = result.last_insert_rowid();
        tracing::debug!(table = %table, id = id, hash = %fingerprint, "Article stored");
        Ok(InsertOutcome::Inserted(id))
    }

    // ========================================================================
    // Read Side
    // ========================================================================

    /// Rows with `id > last_id`, oldest first, for downstream publishers that
    /// track their own high-water mark.
    pub async fn articles_after(
        &self,
        table: ArticleTable,
        last_id: i64,
        limit: i64,
    ) -> Result<Vec<StoredArticle>, DatabaseError> {
        let sql = format!(
            "SELECT id, hash, site_url, title, link, published, tldr FROM {} WHERE id > ? ORDER BY id ASC LIMIT ?",
            table.name()
        );
        sqlx::query_as::<_, StoredArticle>(&sql)
            .bind(last_id)
            .bind(limit.clamp(0, MAX_ARTICLES))
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    pub async fn article_count(&self, table: ArticleTable) -> Result<i64, DatabaseError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: (i64,) = sqlx::query_as(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(count.0)
    }
}
