//! Page acquisition behind the [`PageRenderer`] seam.
//!
//! [`HttpRenderer`] fetches markup directly and is enough for server-rendered
//! sites. [`WebDriverRenderer`] drives a headless browser over the W3C
//! WebDriver protocol for sites that build their article body in script.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::Config;
use crate::util::UserAgentPool;

/// Delay between ready-selector lookups while waiting on a browser page.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// WebDriver's error code for an absent element.
const NO_SUCH_ELEMENT: &str = "no such element";

/// Ceiling on closing a browser session, independent of the page budget.
const SESSION_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RenderError {
    /// Network-level error talking to the page or the browser endpoint
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Page load timed out after {0:?}")]
    Timeout(Duration),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// The ready selector never appeared
    #[error("Timeout waiting for `{selector}` after {waited:?}")]
    WaitTimeout { selector: String, waited: Duration },
    #[error("Invalid ready selector `{0}`")]
    InvalidSelector(String),
    /// The browser could not load the page
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// Any other error reported by the WebDriver endpoint
    #[error("WebDriver error `{error}`: {message}")]
    WebDriver { error: String, message: String },
    #[error("WebDriver session could not be created: {0}")]
    Session(String),
}

impl RenderError {
    /// True when the page itself could not be loaded, as opposed to a
    /// rendering or browser fault.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            RenderError::Network(_)
                | RenderError::HttpStatus(_)
                | RenderError::Timeout(_)
                | RenderError::Navigation(_)
        )
    }
}

/// Turns a URL into final page markup once `ready_selector` is present.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        url: &str,
        ready_selector: &str,
        wait: Duration,
    ) -> Result<String, RenderError>;
}

fn has_selector(html: &str, selector: &str) -> Result<bool, RenderError> {
    let selector = scraper::Selector::parse(selector)
        .map_err(|_| RenderError::InvalidSelector(selector.to_string()))?;
    let document = scraper::Html::parse_document(html);
    let found = document.select(&selector).next().is_some();
    Ok(found)
}

// ============================================================================
// Fetch-only renderer
// ============================================================================

/// Plain GET renderer. There is no script execution, so the ready selector
/// either exists in the served markup or the wait is treated as timed out.
#[derive(Clone)]
pub struct HttpRenderer {
    client: reqwest::Client,
    user_agents: UserAgentPool,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpRenderer {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            user_agents: UserAgentPool::new(&config.user_agents),
            timeout: config.render.page_load_timeout(),
            max_bytes: config.render.max_page_bytes,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, RenderError> {
        let download = async {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::USER_AGENT, self.user_agents.pick())
                .send()
                .await
                .map_err(RenderError::Network)?;

            if !response.status().is_success() {
                return Err(RenderError::HttpStatus(response.status().as_u16()));
            }

            read_limited_text(response, self.max_bytes).await
        };

        tokio::time::timeout(self.timeout, download)
            .await
            .map_err(|_| RenderError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(
        &self,
        url: &str,
        ready_selector: &str,
        wait: Duration,
    ) -> Result<String, RenderError> {
        let html = self.fetch(url).await?;
        tracing::debug!(url = %url, bytes = html.len(), "Fetched page");

        if !has_selector(&html, ready_selector)? {
            return Err(RenderError::WaitTimeout {
                selector: ready_selector.to_string(),
                waited: wait,
            });
        }
        Ok(html)
    }
}

async fn read_limited_text(response: reqwest::Response, limit: usize) -> Result<String, RenderError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(RenderError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(RenderError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(RenderError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

// ============================================================================
// WebDriver renderer
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Headless browser renderer speaking W3C WebDriver to a chromedriver
/// compatible endpoint.
///
/// Every render opens its own session and deletes it before returning,
/// whatever the outcome. One page is loaded at a time.
#[derive(Clone)]
pub struct WebDriverRenderer {
    client: reqwest::Client,
    endpoint: String,
    user_agents: UserAgentPool,
    window_size: String,
    page_load_timeout: Duration,
    poll_interval: Duration,
}

impl WebDriverRenderer {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, config: &Config) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            user_agents: UserAgentPool::new(&config.user_agents),
            window_size: config.render.window_size.clone(),
            page_load_timeout: config.render.page_load_timeout(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the delay between ready-selector lookups.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn capabilities(&self) -> Value {
        let args = vec![
            "--headless=new".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--disable-extensions".to_string(),
            "--disable-dev-tools".to_string(),
            format!("--user-agent={}", self.user_agents.pick()),
            format!("--window-size={}", self.window_size),
        ];
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "timeouts": { "pageLoad": self.page_load_timeout.as_millis() as u64 },
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }

    /// Issues one WebDriver command and unwraps the `value` envelope.
    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RenderError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let wire: WireResponse = response.json().await?;

        if status.is_success() {
            return Ok(wire.value);
        }
        match serde_json::from_value::<WireError>(wire.value) {
            Ok(err) => Err(RenderError::WebDriver {
                error: err.error,
                message: err.message,
            }),
            Err(_) => Err(RenderError::HttpStatus(status.as_u16())),
        }
    }

    async fn new_session(&self) -> Result<String, RenderError> {
        let value = self
            .command(reqwest::Method::POST, "/session", Some(self.capabilities()))
            .await
            .map_err(|e| RenderError::Session(e.to_string()))?;
        let session: NewSession =
            serde_json::from_value(value).map_err(|e| RenderError::Session(e.to_string()))?;
        Ok(session.session_id)
    }

    async fn delete_session(&self, session_id: &str) {
        let path = format!("/session/{}", session_id);
        let close = self.command(reqwest::Method::DELETE, &path, None);
        match tokio::time::timeout(SESSION_CLOSE_TIMEOUT, close).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::warn!(session = %session_id, error = %e, "Failed to close browser session");
            }
            Err(_) => {
                tracing::warn!(session = %session_id, "Browser session close timed out");
            }
        }
    }

    async fn drive(
        &self,
        session_id: &str,
        url: &str,
        ready_selector: &str,
        wait: Duration,
    ) -> Result<String, RenderError> {
        self.command(
            reqwest::Method::POST,
            &format!("/session/{}/url", session_id),
            Some(json!({ "url": url })),
        )
        .await
        .map_err(|e| match e {
            RenderError::WebDriver { error, message } => {
                RenderError::Navigation(format!("{}: {}", error, message))
            }
            other => other,
        })?;

        self.wait_for(session_id, ready_selector, wait).await?;

        let source = self
            .command(
                reqwest::Method::GET,
                &format!("/session/{}/source", session_id),
                None,
            )
            .await?;
        match source {
            Value::String(html) => Ok(html),
            other => Err(RenderError::WebDriver {
                error: "invalid page source".to_string(),
                message: other.to_string(),
            }),
        }
    }

    /// Polls for `ready_selector` until it appears or `wait` runs out. Each
    /// lookup is bounded by the time left, so a stalled browser cannot
    /// stretch the wait.
    async fn wait_for(
        &self,
        session_id: &str,
        ready_selector: &str,
        wait: Duration,
    ) -> Result<(), RenderError> {
        let path = format!("/session/{}/element", session_id);
        let body = json!({ "using": "css selector", "value": ready_selector });
        let started = Instant::now();
        let deadline = started + wait;
        let timed_out = || RenderError::WaitTimeout {
            selector: ready_selector.to_string(),
            waited: started.elapsed(),
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let lookup = self.command(reqwest::Method::POST, &path, Some(body.clone()));
            let Ok(found) = tokio::time::timeout(remaining, lookup).await else {
                return Err(timed_out());
            };
            match found {
                Ok(_) => return Ok(()),
                Err(RenderError::WebDriver { error, .. }) if error == NO_SUCH_ELEMENT => {}
                Err(RenderError::WebDriver { error, message }) if error == "invalid selector" => {
                    tracing::debug!(selector = %ready_selector, message = %message, "Selector rejected by browser");
                    return Err(RenderError::InvalidSelector(ready_selector.to_string()));
                }
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Err(timed_out());
            }
            let pause = self
                .poll_interval
                .min(deadline.saturating_duration_since(Instant::now()));
            tokio::time::sleep(pause).await;
        }
    }
}

#[async_trait]
impl PageRenderer for WebDriverRenderer {
    async fn render(
        &self,
        url: &str,
        ready_selector: &str,
        wait: Duration,
    ) -> Result<String, RenderError> {
        let session_id = tokio::time::timeout(self.page_load_timeout, self.new_session())
            .await
            .map_err(|_| {
                RenderError::Session(format!("no response after {:?}", self.page_load_timeout))
            })??;
        tracing::debug!(session = %session_id, url = %url, "Browser session opened");

        // Navigation, the ready wait and the source read share one ceiling.
        let budget = self.page_load_timeout + wait;
        let result = tokio::time::timeout(budget, self.drive(&session_id, url, ready_selector, wait))
            .await
            .unwrap_or(Err(RenderError::Timeout(budget)));
        self.delete_session(&session_id).await;
        result
    }
}
