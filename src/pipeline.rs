//! One harvesting pass over the feed list.
//!
//! Per item: fingerprint check, link rewrite, extraction, summary, insert.
//! Everything runs sequentially; a failing feed or item is logged and skipped,
//! never fatal to the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{Config, LinkRewriteConfig};
use crate::content::{rewrite_link, ContentExtractor};
use crate::feed::{FeedFetcher, FeedItem};
use crate::storage::{ArticleTable, Database, Fingerprint, InsertOutcome, NewArticle};
use crate::summarize::Summarizer;
use crate::SENTINEL;

// ============================================================================
// Run Output
// ============================================================================

/// Extraction counters for one run. Passthrough items are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    pub attempts: usize,
    pub successes: usize,
    /// Pages read whose text was missing or rejected by the validator
    pub validation_failures: usize,
    /// Navigation, wait and render failures
    pub errors: usize,
}

impl ExtractionStats {
    /// Successful extractions as a percentage of attempts, 0 when nothing was attempted.
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64 * 100.0
    }

    pub fn failures(&self) -> usize {
        self.validation_failures + self.errors
    }
}

/// One newly seen article, in the shape downstream publishers consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedItem {
    #[serde(rename = "SITE_URL")]
    pub feed_url: String,
    #[serde(rename = "TITLE")]
    pub title: String,
    /// Rewritten link. The stored record keeps the feed's original link.
    #[serde(rename = "LINK")]
    pub link: String,
    #[serde(rename = "PUBLISHED")]
    pub published: String,
    #[serde(rename = "tldr")]
    pub summary: String,
    #[serde(skip)]
    pub table: ArticleTable,
    /// Whether the insert committed a new row
    #[serde(skip)]
    pub persisted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// New items in processing order
    pub items: Vec<ProcessedItem>,
    pub stats: ExtractionStats,
    pub feeds_failed: usize,
    pub duplicates_skipped: usize,
    /// Items dated before the cutoff, or undated while a cutoff is set
    pub cutoff_skipped: usize,
}

impl RunReport {
    pub fn persisted(&self) -> usize {
        self.items.iter().filter(|i| i.persisted).count()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    db: Database,
    fetcher: FeedFetcher,
    extractor: ContentExtractor,
    summarizer: Arc<dyn Summarizer>,
    passthrough_feed_url: String,
    link_rewrite: LinkRewriteConfig,
    cutoff: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// `client` is used for feed downloads; pass the one from
    /// [`build_http_client`](crate::util::build_http_client) so its redirect
    /// policy applies.
    pub fn new(
        config: &Config,
        client: reqwest::Client,
        db: Database,
        extractor: ContentExtractor,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            db,
            fetcher: FeedFetcher::new(client, config),
            extractor,
            summarizer,
            passthrough_feed_url: config.passthrough_feed_url.clone(),
            link_rewrite: config.link_rewrite.clone(),
            cutoff: None,
        }
    }

    /// Skips items published before `cutoff`. With a cutoff set, items
    /// without a parseable publication date are skipped too.
    pub fn with_cutoff(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.cutoff = cutoff;
        self
    }

    fn before_cutoff(&self, item: &FeedItem) -> bool {
        match (self.cutoff, item.published_at()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(cutoff), Some(published)) => published < cutoff,
        }
    }

    /// Processes every feed once, in order.
    ///
    /// Never fails: feed errors count towards `feeds_failed`, item errors are
    /// logged. Stats start from zero on every call.
    pub async fn run(&self, feeds: &[String]) -> RunReport {
        let mut report = RunReport::default();

        for feed_url in feeds {
            let items = match self.fetcher.fetch_items(feed_url).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(feed = %feed_url, error = %e, "Error processing feed, skipping");
                    report.feeds_failed += 1;
                    continue;
                }
            };

            let table = self.db.table_for(feed_url);
            for item in &items {
                self.process_item(feed_url, table, item, &mut report).await;
            }
        }

        let stats = &report.stats;
        if stats.attempts > 0 {
            tracing::info!(
                attempts = stats.attempts,
                successes = stats.successes,
                validation_failures = stats.validation_failures,
                errors = stats.errors,
                success_rate = %format!("{:.2}%", stats.success_rate()),
                "Content extraction statistics"
            );
        }
        tracing::info!(
            feeds = feeds.len(),
            feeds_failed = report.feeds_failed,
            new_items = report.items.len(),
            persisted = report.persisted(),
            duplicates = report.duplicates_skipped,
            before_cutoff = report.cutoff_skipped,
            "Run complete"
        );

        report
    }

    async fn process_item(
        &self,
        feed_url: &str,
        table: ArticleTable,
        item: &FeedItem,
        report: &mut RunReport,
    ) {
        if self.before_cutoff(item) {
            tracing::debug!(link = %item.link, published = ?item.published_raw, "Item predates cutoff, skipping");
            report.cutoff_skipped += 1;
            return;
        }

        let fingerprint = Fingerprint::compute(feed_url, &item.title, &item.link);
        match self.db.article_exists(&fingerprint, table).await {
            Ok(true) => {
                report.duplicates_skipped += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Without a dedup answer the item could be stored twice
                tracing::error!(link = %item.link, error = %e, "Dedup lookup failed, skipping item");
                return;
            }
        }

        let link = rewrite_link(
            &item.link,
            &self.link_rewrite.marker,
            &self.link_rewrite.origin,
        );

        let summary = if feed_url == self.passthrough_feed_url {
            tracing::debug!(link = %link, "Using feed description as summary");
            item.description.clone()
        } else {
            self.extract_and_summarize(&link, &mut report.stats).await
        };

        let record = NewArticle {
            feed_url: feed_url.to_string(),
            title: item.title.clone(),
            link: item.link.clone(),
            published: item.published(),
            summary,
        };

        let persisted = match self.db.insert_article(&record).await {
            Ok(InsertOutcome::Inserted(_)) => true,
            Ok(InsertOutcome::Duplicate) => false,
            Err(e) => {
                tracing::error!(link = %record.link, table = %table, error = %e, "Failed to store article");
                false
            }
        };

        report.items.push(ProcessedItem {
            feed_url: record.feed_url,
            title: record.title,
            link,
            published: record.published,
            summary: record.summary,
            table,
            persisted,
        });
    }

    async fn extract_and_summarize(&self, link: &str, stats: &mut ExtractionStats) -> String {
        stats.attempts += 1;
        let extraction = match self.extractor.extract(link).await {
            Ok(extraction) => extraction,
            Err(failure) => {
                if failure.is_validation() {
                    stats.validation_failures += 1;
                } else {
                    stats.errors += 1;
                }
                return SENTINEL.to_string();
            }
        };
        stats.successes += 1;

        self.summarizer
            .summarize(&extraction.text)
            .await
            .unwrap_or_else(|| SENTINEL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let stats = ExtractionStats {
            attempts: 4,
            successes: 3,
            validation_failures: 1,
            errors: 0,
        };
        assert!((stats.success_rate() - 75.0).abs() < f64::EPSILON);
        assert_eq!(stats.failures(), 1);
        assert_eq!(ExtractionStats::default().success_rate(), 0.0);
    }

    #[test]
    fn test_processed_item_serializes_with_publisher_keys() {
        let item = ProcessedItem {
            feed_url: "https://feed.example/rss".to_string(),
            title: "Title".to_string(),
            link: "https://any.run/cybersecurity-blog/x/".to_string(),
            published: "04/Nov/2024".to_string(),
            summary: "Summary".to_string(),
            table: ArticleTable::AllArticles,
            persisted: true,
        };
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "SITE_URL": "https://feed.example/rss",
                "TITLE": "Title",
                "LINK": "https://any.run/cybersecurity-blog/x/",
                "PUBLISHED": "04/Nov/2024",
                "tldr": "Summary"
            })
        );
    }
}
