use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Append-only side log of extraction failures.
///
/// One line per failure: `<RFC 3339 timestamp> - <reason> - <url>`. Kept
/// apart from the tracing output so failed URLs can be reviewed or replayed.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry. Write errors are logged and swallowed; losing a side
    /// log line never fails the extraction that produced it.
    pub async fn record(&self, url: &str, reason: &str) {
        if let Err(e) = self.append(url, reason).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write failure log");
        }
    }

    async fn append(&self, url: &str, reason: &str) -> std::io::Result<()> {
        let line = format!(
            "{} - {} - {}\n",
            chrono::Utc::now().to_rfc3339(),
            reason.replace('\n', " "),
            url
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("failed_extractions.log"));

        log.record("https://example.com/a", "No content").await;
        log.record("https://example.com/b", "Validation failed:\ntoo short").await;

        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - No content - https://example.com/a"));
        assert!(lines[1].ends_with(" - Validation failed: too short - https://example.com/b"));

        let timestamp = lines[0].split(" - ").next().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[tokio::test]
    async fn test_unwritable_path_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let log = FailureLog::new(dir.path());
        log.record("https://example.com/a", "No content").await;
    }
}
