//! End-to-end runs of the harvesting pipeline.
//!
//! Every HTTP collaborator (feed server, article pages, generation endpoint)
//! is a wiremock server and every test gets its own in-memory SQLite database.

use std::sync::Arc;

use infobroker::config::Config;
use infobroker::content::{ContentExtractor, FailureLog, HttpRenderer};
use infobroker::pipeline::{Pipeline, RunReport};
use infobroker::storage::{ArticleTable, Database};
use infobroker::summarize::OllamaSummarizer;
use infobroker::util::build_http_client;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTICLE_TEXT: &str = "Researchers disclosed a new ransomware strain that targets VMware ESXi hosts \
    and encrypts virtual machine disks within minutes of gaining initial access to the network.";

fn article_page(body: &str) -> String {
    format!(
        "<html><body><nav><p>Menu</p></nav><article><h2>Story</h2><p>{}</p></article></body></html>",
        body
    )
}

fn rss(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link)| {
            format!(
                "<item><title>{}</title><link>{}</link>\
                 <description>Feed description for {}</description>\
                 <pubDate>Mon, 04 Nov 2024 18:47:32 -0500</pubDate></item>",
                title, link, title
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Test</title>{}</channel></rss>"#,
        items
    )
}

struct Harness {
    server: MockServer,
    config: Config,
    db: Database,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.failure_log = dir.path().join("failed_extractions.log");
        config.summarizer.endpoint = format!("{}/api/generate", server.uri());
        config.advisory_feed_url = format!("{}/nvd-rss.xml", server.uri());
        config.passthrough_feed_url = format!("{}/passthrough.xml", server.uri());
        config.link_rewrite.origin = server.uri();

        let db = Database::open(":memory:")
            .await
            .unwrap()
            .with_advisory_feed(config.advisory_feed_url.clone());

        Self {
            server,
            config,
            db,
            _dir: dir,
        }
    }

    fn url(&self, p: &str) -> String {
        format!("{}{}", self.server.uri(), p)
    }

    async fn serve(&self, p: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    async fn summaries(&self, response: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": response })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    fn pipeline(&self) -> Pipeline {
        let client = build_http_client().unwrap();
        let extractor = ContentExtractor::new(
            Arc::new(HttpRenderer::new(client.clone(), &self.config)),
            FailureLog::new(&self.config.failure_log),
            &self.config,
        );
        let summarizer = Arc::new(OllamaSummarizer::new(client.clone(), &self.config));
        Pipeline::new(&self.config, client, self.db.clone(), extractor, summarizer)
    }

    async fn run(&self, feeds: &[String]) -> RunReport {
        self.pipeline().run(feeds).await
    }
}

// ============================================================================
// Happy path and idempotence
// ============================================================================

#[tokio::test]
async fn test_new_items_are_extracted_summarized_and_stored() {
    let h = Harness::new().await;
    let feed = h.url("/feed.xml");
    let items = rss(&[
        ("Good", h.url("/posts/good").as_str()),
        ("Broken", h.url("/posts/broken").as_str()),
    ]);
    h.serve("/feed.xml", items).await;
    h.serve("/posts/good", article_page(ARTICLE_TEXT)).await;
    h.serve("/posts/broken", article_page("Error 404: page not found")).await;
    h.summaries("Ransomware hits ESXi.", 1).await;

    let report = h.run(&[feed]).await;

    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[0].title, "Good");
    assert_eq!(report.items[0].summary, "Ransomware hits ESXi.");
    assert_eq!(report.items[0].published, "04/Nov/2024");
    assert_eq!(report.items[1].title, "Broken");
    assert_eq!(report.items[1].summary, "N/A");
    assert_eq!(report.persisted(), 2);

    assert_eq!(report.stats.attempts, 2);
    assert_eq!(report.stats.successes, 1);
    assert_eq!(report.stats.validation_failures, 1);
    assert_eq!(report.stats.errors, 0);

    assert_eq!(h.db.article_count(ArticleTable::AllArticles).await.unwrap(), 2);
    assert_eq!(h.db.article_count(ArticleTable::Nist).await.unwrap(), 0);

    let log = std::fs::read_to_string(&h.config.failure_log).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("/posts/broken"));
}

#[tokio::test]
async fn test_second_run_stores_nothing_new() {
    let h = Harness::new().await;
    let feed = h.url("/feed.xml");
    h.serve("/feed.xml", rss(&[("Good", h.url("/posts/good").as_str())])).await;
    h.serve("/posts/good", article_page(ARTICLE_TEXT)).await;
    // One generation call across both runs
    h.summaries("Summary.", 1).await;

    let first = h.run(&[feed.clone()]).await;
    assert_eq!(first.items.len(), 1);

    let second = h.run(&[feed]).await;
    assert!(second.items.is_empty());
    assert_eq!(second.duplicates_skipped, 1);
    assert_eq!(second.stats.attempts, 0);
    assert_eq!(h.db.article_count(ArticleTable::AllArticles).await.unwrap(), 1);
}

// ============================================================================
// Feed-specific behavior
// ============================================================================

#[tokio::test]
async fn test_passthrough_feed_uses_description_without_extraction() {
    let h = Harness::new().await;
    let feed = h.config.passthrough_feed_url.clone();
    h.serve("/passthrough.xml", rss(&[("Embedded", h.url("/posts/embedded").as_str())]))
        .await;
    Mock::given(method("GET"))
        .and(path("/posts/embedded"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(ARTICLE_TEXT)))
        .expect(0)
        .mount(&h.server)
        .await;
    h.summaries("unused", 0).await;

    let report = h.run(&[feed]).await;

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].summary, "Feed description for Embedded");
    assert_eq!(report.stats.attempts, 0);

    let stored = h
        .db
        .articles_after(ArticleTable::AllArticles, 0, 10)
        .await
        .unwrap();
    assert_eq!(stored[0].summary, "Feed description for Embedded");
}

#[tokio::test]
async fn test_advisory_feed_routes_to_nist_table() {
    let h = Harness::new().await;
    let feed = h.config.advisory_feed_url.clone();
    h.serve("/nvd-rss.xml", rss(&[("CVE-2024-1234", h.url("/vuln/CVE-2024-1234").as_str())]))
        .await;
    h.serve("/vuln/CVE-2024-1234", article_page(ARTICLE_TEXT)).await;
    h.summaries("Advisory summary.", 1).await;

    let report = h.run(&[feed]).await;

    assert_eq!(report.items[0].table, ArticleTable::Nist);
    assert_eq!(h.db.article_count(ArticleTable::Nist).await.unwrap(), 1);
    assert_eq!(h.db.article_count(ArticleTable::AllArticles).await.unwrap(), 0);
}

#[tokio::test]
async fn test_marked_link_is_rewritten_before_extraction() {
    let h = Harness::new().await;
    let feed = h.url("/anyrun.xml");
    h.serve("/anyrun.xml", rss(&[("Stealer", "/cybersecurity-blog/stealer-analysis/")]))
        .await;
    Mock::given(method("GET"))
        .and(path("/cybersecurity-blog/stealer-analysis/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(ARTICLE_TEXT)))
        .expect(1)
        .mount(&h.server)
        .await;
    h.summaries("Stealer summary.", 1).await;

    let report = h.run(&[feed]).await;

    // Reported link is rewritten, stored link is the feed's own
    assert_eq!(
        report.items[0].link,
        h.url("/cybersecurity-blog/stealer-analysis/")
    );
    let stored = h
        .db
        .articles_after(ArticleTable::AllArticles, 0, 10)
        .await
        .unwrap();
    assert_eq!(stored[0].link, "/cybersecurity-blog/stealer-analysis/");
}

#[tokio::test]
async fn test_items_before_cutoff_are_skipped() {
    let h = Harness::new().await;
    let feed = format!(
        r#"<rss><channel>
            <item><title>Late evening EST</title><link>{}</link>
                <pubDate>Fri, 30 May 2025 23:00:00 -0500</pubDate></item>
            <item><title>Before cutoff</title><link>{}</link>
                <pubDate>Fri, 30 May 2025 18:00:00 -0500</pubDate></item>
            <item><title>Undated</title><link>{}</link></item>
        </channel></rss>"#,
        h.url("/posts/late"),
        h.url("/posts/early"),
        h.url("/posts/undated"),
    );
    h.serve("/feed.xml", feed).await;
    h.serve("/posts/late", article_page(ARTICLE_TEXT)).await;
    Mock::given(method("GET"))
        .and(path("/posts/early"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_page(ARTICLE_TEXT)))
        .expect(0)
        .mount(&h.server)
        .await;
    h.summaries("Summary.", 1).await;

    let mut config = h.config.clone();
    config.cutoff_date = Some("2025-05-31".to_string());
    let report = h
        .pipeline()
        .with_cutoff(config.cutoff().unwrap())
        .run(&[h.url("/feed.xml")])
        .await;

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].title, "Late evening EST");
    assert_eq!(report.cutoff_skipped, 2);
    assert_eq!(h.db.article_count(ArticleTable::AllArticles).await.unwrap(), 1);
}

// ============================================================================
// Degradation
// ============================================================================

#[tokio::test]
async fn test_feed_redirects_follow_shared_client_policy() {
    let h = Harness::new().await;
    h.serve("/feed.xml", rss(&[("Good", h.url("/posts/good").as_str())])).await;
    h.serve("/posts/good", article_page(ARTICLE_TEXT)).await;
    h.summaries("Summary.", 1).await;
    for (from, to) in [
        ("/moved", "/feed.xml"),
        ("/hop1", "/hop2"),
        ("/hop2", "/hop3"),
        ("/hop3", "/hop4"),
        ("/hop4", "/hop5"),
        ("/hop5", "/hop6"),
        ("/hop6", "/hop7"),
        ("/hop7", "/feed.xml"),
    ] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", h.url(to).as_str()))
            .mount(&h.server)
            .await;
    }

    // One hop is followed; seven exceed the shared client's limit
    let report = h.run(&[h.url("/moved"), h.url("/hop1")]).await;

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.feeds_failed, 1);
}

#[tokio::test]
async fn test_failing_feed_does_not_stop_the_run() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/down.xml"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;
    h.serve("/feed.xml", rss(&[("Good", h.url("/posts/good").as_str())])).await;
    h.serve("/posts/good", article_page(ARTICLE_TEXT)).await;
    h.summaries("Summary.", 1).await;

    let report = h.run(&[h.url("/down.xml"), h.url("/feed.xml")]).await;

    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.items.len(), 1);
}

#[tokio::test]
async fn test_summarizer_outage_stores_sentinel() {
    let h = Harness::new().await;
    h.serve("/feed.xml", rss(&[("Good", h.url("/posts/good").as_str())])).await;
    h.serve("/posts/good", article_page(ARTICLE_TEXT)).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let report = h.run(&[h.url("/feed.xml")]).await;

    assert_eq!(report.stats.successes, 1);
    assert_eq!(report.items[0].summary, "N/A");
    assert!(report.items[0].persisted);
}

#[tokio::test]
async fn test_page_without_ready_selector_counts_as_error() {
    let h = Harness::new().await;
    h.serve("/feed.xml", rss(&[("Bare", h.url("/posts/bare").as_str())])).await;
    h.serve(
        "/posts/bare",
        format!("<html><body><p>{}</p></body></html>", ARTICLE_TEXT),
    )
    .await;
    h.summaries("unused", 0).await;

    let report = h.run(&[h.url("/feed.xml")]).await;

    assert_eq!(report.items[0].summary, "N/A");
    assert_eq!(report.stats.errors, 1);
    assert_eq!(report.stats.validation_failures, 0);
    let log = std::fs::read_to_string(&h.config.failure_log).unwrap();
    assert!(log.contains("Timeout waiting for content"));
}
