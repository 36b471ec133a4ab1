use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use infobroker::config::Config;
use infobroker::content::{ContentExtractor, FailureLog, HttpRenderer, WebDriverRenderer};
use infobroker::feed::load_feed_list;
use infobroker::pipeline::Pipeline;
use infobroker::storage::{Database, DatabaseError};
use infobroker::summarize::OllamaSummarizer;
use infobroker::util::build_http_client;

#[derive(Parser, Debug)]
#[command(
    name = "infobroker",
    version,
    about = "Harvest security-news feeds, extract and summarize new articles"
)]
struct Args {
    /// TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "infobroker.toml")]
    config: PathBuf,

    /// Feed list, one URL per line (overrides the config)
    #[arg(long, value_name = "FILE")]
    feeds: Option<PathBuf>,

    /// SQLite database (overrides the config)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Print the new items as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config '{}'", args.config.display()))?;
    config.apply_env();
    if let Some(feeds) = args.feeds {
        config.feeds_file = feeds;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }
    let cutoff = config.cutoff().context("Invalid article cutoff date")?;
    if let Some(cutoff) = cutoff {
        tracing::info!(cutoff = %cutoff.to_rfc3339(), "Skipping items published before cutoff");
    }

    // Read the whole feed list before any network activity
    let feeds = load_feed_list(&config.feeds_file).with_context(|| {
        "Cannot start without a feed list".to_string()
    })?;
    if feeds.is_empty() {
        tracing::warn!(path = %config.feeds_file.display(), "Feed list is empty");
    }

    let db_path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path).await {
        Ok(db) => db.with_advisory_feed(config.advisory_feed_url.clone()),
        Err(DatabaseError::Locked) => {
            anyhow::bail!(
                "Database '{}' is locked by another process. Only one run may write at a time.",
                db_path
            );
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let client = build_http_client().context("Failed to build HTTP client")?;

    let mut extractor = ContentExtractor::new(
        Arc::new(HttpRenderer::new(client.clone(), &config)),
        FailureLog::new(&config.failure_log),
        &config,
    );
    match &config.render.webdriver_url {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "Rendering script-heavy pages through WebDriver");
            extractor = extractor.with_browser(Arc::new(WebDriverRenderer::new(
                client.clone(),
                endpoint.clone(),
                &config,
            )));
        }
        None => {
            tracing::info!("No WebDriver endpoint configured, fetching all pages over HTTP");
        }
    }

    let summarizer = Arc::new(OllamaSummarizer::new(client.clone(), &config));
    let pipeline =
        Pipeline::new(&config, client, db, extractor, summarizer).with_cutoff(cutoff);

    tracing::info!(feeds = feeds.len(), "Starting run");
    let report = pipeline.run(&feeds).await;

    if args.json {
        let out = serde_json::to_string_pretty(&report.items)
            .context("Failed to serialize results")?;
        println!("{}", out);
    } else {
        println!(
            "{} new articles ({} stored), {} duplicates skipped, {} feeds failed, extraction {}/{} ({:.2}%)",
            report.items.len(),
            report.persisted(),
            report.duplicates_skipped,
            report.feeds_failed,
            report.stats.successes,
            report.stats.attempts,
            report.stats.success_rate()
        );
    }

    Ok(())
}
