//! Configuration file parser for `infobroker.toml`.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//! A handful of environment variables override the file, see [`Config::apply_env`].
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid cutoff_date `{0}`: expected YYYY-MM-DD or RFC 3339")]
    InvalidCutoff(String),
}

// ============================================================================
// Defaults
// ============================================================================

/// Feed whose items are routed to the reserved `nist` table.
pub const ADVISORY_FEED_URL: &str = "http://nvd.nist.gov/download/nvd-rss.xml";

/// Feed that already embeds the full article text in `<description>`.
pub const PASSTHROUGH_FEED_URL: &str = "https://feeds.feedburner.com/TheHackersNews";

const DEFAULT_USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/42.0.2311.135 Safari/537.36 Edge/12.246",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_11_2) AppleWebKit/601.3.9 (KHTML, like Gecko) Version/9.0.2 Safari/601.3.9",
];

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Newline-delimited list of feed URLs.
    pub feeds_file: PathBuf,

    /// SQLite database holding the `nist` and `all_articles` tables.
    pub database_path: PathBuf,

    /// Append-only log of extraction failures.
    pub failure_log: PathBuf,

    /// User-agent rotation pool for every outbound request.
    pub user_agents: Vec<String>,

    pub advisory_feed_url: String,

    pub passthrough_feed_url: String,

    /// Items published before this date (`YYYY-MM-DD`, midnight UTC, or a
    /// full RFC 3339 timestamp) are skipped. Unset processes everything.
    pub cutoff_date: Option<String>,

    pub fetch: FetchConfig,

    pub render: RenderConfig,

    pub summarizer: SummarizerConfig,

    pub link_rewrite: LinkRewriteConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Hard ceiling for one feed download. Slow feed servers are common.
    pub timeout_secs: u64,
    pub max_feed_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// WebDriver endpoint (e.g. a local chromedriver). `None` renders every
    /// page through a plain HTTP fetch.
    pub webdriver_url: Option<String>,

    /// How long to wait for the content-ready selector.
    pub wait_secs: u64,

    pub page_load_timeout_secs: u64,

    /// Browser window size as `width,height`.
    pub window_size: String,

    pub max_page_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Generation endpoint accepting `{model, prompt, stream}`.
    pub endpoint: String,
    pub model: String,
    /// Local inference is slow; this is a ceiling, not an expectation.
    pub timeout_secs: u64,
    /// Article text beyond this many characters is cut before prompting.
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkRewriteConfig {
    /// Links containing this substring are relative to `origin`.
    pub marker: String,
    pub origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds_file: PathBuf::from("./feeds.txt"),
            database_path: PathBuf::from("./articles.db"),
            failure_log: PathBuf::from("./failed_extractions.log"),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            advisory_feed_url: ADVISORY_FEED_URL.to_string(),
            passthrough_feed_url: PASSTHROUGH_FEED_URL.to_string(),
            cutoff_date: None,
            fetch: FetchConfig::default(),
            render: RenderConfig::default(),
            summarizer: SummarizerConfig::default(),
            link_rewrite: LinkRewriteConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            max_feed_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            webdriver_url: None,
            wait_secs: 30,
            page_load_timeout_secs: 60,
            window_size: "1920,1080".to_string(),
            max_page_bytes: 5 * 1024 * 1024, // 5MB
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/api/generate".to_string(),
            model: "granite3.2:8b".to_string(),
            timeout_secs: 2000,
            max_input_chars: 10_000,
        }
    }
}

impl Default for LinkRewriteConfig {
    fn default() -> Self {
        Self {
            marker: "/cybersecurity-blog/".to_string(),
            origin: "https://any.run".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RenderConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 11] = [
        "feeds_file",
        "database_path",
        "failure_log",
        "user_agents",
        "advisory_feed_url",
        "passthrough_feed_url",
        "cutoff_date",
        "fetch",
        "render",
        "summarizer",
        "link_rewrite",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unparseable `cutoff_date` → `Err(ConfigError::InvalidCutoff)`
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    ///
    /// Environment overrides are NOT applied here; call [`Config::apply_env`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.cutoff()?;
        tracing::info!(
            path = %path.display(),
            model = %config.summarizer.model,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parsed [`Config::cutoff_date`]. A bare date means midnight UTC.
    pub fn cutoff(&self) -> Result<Option<DateTime<Utc>>, ConfigError> {
        let Some(raw) = self.cutoff_date.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(Some(date.and_time(NaiveTime::MIN).and_utc()));
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| ConfigError::InvalidCutoff(raw.to_string()))
    }

    /// Apply environment variable overrides. Env vars take precedence over the file.
    ///
    /// | Variable                | Field                     |
    /// |-------------------------|---------------------------|
    /// | `INFOBROKER_FEEDS_FILE` | `feeds_file`              |
    /// | `INFOBROKER_DATABASE`   | `database_path`           |
    /// | `OLLAMA_URL`            | `summarizer.endpoint`     |
    /// | `OLLAMA_MODEL`          | `summarizer.model`        |
    /// | `WEBDRIVER_URL`         | `render.webdriver_url`    |
    /// | `ARTICLE_CUTOFF_DATE`   | `cutoff_date`             |
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("INFOBROKER_FEEDS_FILE") {
            self.feeds_file = PathBuf::from(v);
        }
        if let Some(v) = get("INFOBROKER_DATABASE") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("OLLAMA_URL") {
            self.summarizer.endpoint = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.summarizer.model = v;
        }
        if let Some(v) = get("WEBDRIVER_URL") {
            self.render.webdriver_url = Some(v);
        }
        if let Some(v) = get("ARTICLE_CUTOFF_DATE") {
            self.cutoff_date = Some(v);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
