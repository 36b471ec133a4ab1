use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_items, FeedItem, ParseError};
use crate::config::Config;
use crate::util::UserAgentPool;

/// Errors that can occur during feed fetching operations.
///
/// Every variant is recoverable at the run level: the pipeline logs it and
/// moves on to the next feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured ceiling
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Feed body could not be parsed as XML
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Downloads feed documents.
///
/// One attempt per feed: there is no retry or backoff, a single timeout or
/// error status is terminal for that feed in this run.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    user_agents: UserAgentPool,
    timeout: Duration,
    max_bytes: usize,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            user_agents: UserAgentPool::new(&config.user_agents),
            timeout: config.fetch.timeout(),
            max_bytes: config.fetch.max_feed_bytes,
        }
    }

    /// Fetches the raw feed body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request plus body read exceeded the ceiling
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded `max_feed_bytes`
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let user_agent = self.user_agents.pick();
        tracing::debug!(feed = %url, user_agent = %user_agent, "Fetching feed");

        let download = async {
            let response = self
                .client
                .get(url)
                .header(reqwest::header::USER_AGENT, user_agent)
                .send()
                .await
                .map_err(FetchError::Network)?;

            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            read_limited_bytes(response, self.max_bytes).await
        };

        tokio::time::timeout(self.timeout, download)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    /// Fetches a feed and parses its items.
    pub async fn fetch_items(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        let bytes = self.fetch(url).await?;
        let items = parse_items(&bytes)?;
        tracing::info!(feed = %url, items = items.len(), bytes = bytes.len(), "Fetched feed");
        Ok(items)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title><link>https://example.com/a</link></item>
</channel></rss>"#;

    fn fetcher(config: &Config) -> FeedFetcher {
        FeedFetcher::new(reqwest::Client::new(), config)
    }

    #[tokio::test]
    async fn test_fetch_items_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let items = fetcher(&Config::default())
            .fetch_items(&format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Test");
    }

    #[tokio::test]
    async fn test_user_agent_drawn_from_pool() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(wiremock::matchers::header("user-agent", "pool-agent/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = Config {
            user_agents: vec!["pool-agent/1.0".to_string()],
            ..Config::default()
        };
        let result = fetcher(&config).fetch(&mock_server.uri()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_404_error_no_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = fetcher(&Config::default())
            .fetch(&mock_server.uri())
            .await
            .unwrap_err();
        match err {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_500_error_is_terminal() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1) // no retry
            .mount(&mock_server)
            .await;

        let err = fetcher(&Config::default())
            .fetch(&mock_server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(500)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let mut config = Config::default();
        config.fetch.timeout_secs = 1;
        let err = fetcher(&config)
            .fetch(&mock_server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_response_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let mut config = Config::default();
        config.fetch.max_feed_bytes = 1024;
        let err = fetcher(&config)
            .fetch(&mock_server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ResponseTooLarge(1024)));
    }

    #[tokio::test]
    async fn test_malformed_feed_parse_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss><item></rss>"))
            .mount(&mock_server)
            .await;

        let err = fetcher(&Config::default())
            .fetch_items(&mock_server.uri())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Shut the server down so the port refuses connections
        let mock_server = MockServer::start().await;
        let uri = mock_server.uri();
        drop(mock_server);

        let err = fetcher(&Config::default()).fetch(&uri).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }
}
