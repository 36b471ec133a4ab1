use std::path::Path;
use thiserror::Error;

use crate::util::validate_url;

/// Errors that can occur while loading the feed list.
///
/// A feed list that cannot be read is a startup failure; the run never begins.
#[derive(Debug, Error)]
pub enum FeedListError {
    #[error("Failed to read feed list '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reads the newline-delimited feed list in full.
///
/// Lines are trimmed. Blank lines and lines starting with `#` are skipped.
/// Lines that are not valid http(s) URLs are skipped with a warning rather
/// than failing the whole list. Order is preserved; duplicates are kept
/// (the dedup store makes re-processing a no-op).
pub fn load_feed_list(path: &Path) -> Result<Vec<String>, FeedListError> {
    let content = std::fs::read_to_string(path).map_err(|source| FeedListError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut feeds = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match validate_url(line) {
            Ok(_) => feeds.push(line.to_string()),
            Err(e) => {
                tracing::warn!(
                    line = lineno + 1,
                    entry = %line,
                    error = %e,
                    "Skipping invalid feed list entry"
                );
            }
        }
    }

    tracing::info!(path = %path.display(), count = feeds.len(), "Loaded feed list");
    Ok(feeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# security feeds\nhttps://example.com/rss.xml\n\n   \n  https://blog.example.org/feed  \n#https://disabled.example.com/rss"
        )
        .unwrap();

        let feeds = load_feed_list(file.path()).unwrap();
        assert_eq!(
            feeds,
            vec![
                "https://example.com/rss.xml".to_string(),
                "https://blog.example.org/feed".to_string(),
            ]
        );
    }

    #[test]
    fn test_invalid_entries_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a url\nftp://example.com/feed\nhttp://example.com/ok").unwrap();

        let feeds = load_feed_list(file.path()).unwrap();
        assert_eq!(feeds, vec!["http://example.com/ok".to_string()]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_feed_list(&dir.path().join("feeds.txt")).unwrap_err();
        assert!(err.to_string().contains("feeds.txt"));
    }

    #[test]
    fn test_empty_file_yields_no_feeds() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(load_feed_list(file.path()).unwrap().is_empty());
    }
}
